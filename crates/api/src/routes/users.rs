use axum::routing::get;
use axum::Router;

use crate::handlers::users;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// GET    /{user_id}/batches   -> list_batches
/// GET    /{user_id}/history   -> list_history
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}/batches", get(users::list_batches))
        .route("/{user_id}/history", get(users::list_history))
}
