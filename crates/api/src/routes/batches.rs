//! Route definitions for the `/batches` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::batches;
use crate::state::AppState;

/// Routes mounted at `/batches`.
///
/// ```text
/// POST   /                -> submit_batch
/// GET    /{batch_id}      -> get_batch
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(batches::submit_batch))
        .route("/{batch_id}", get(batches::get_batch))
}
