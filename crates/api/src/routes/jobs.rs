//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                  -> submit_job
/// GET    /{job_id}          -> get_job
/// GET    /{job_id}/download -> download_video
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/{job_id}", get(jobs::get_job))
        .route("/{job_id}/download", get(jobs::download_video))
}
