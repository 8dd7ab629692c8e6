pub mod batches;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod users;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws/jobs/{job_id}                 WebSocket status subscription
///
/// /jobs                             submit (POST)
/// /jobs/{job_id}                    status record
///
/// /batches                          submit (POST)
/// /batches/{batch_id}               batch record
///
/// /users/{user_id}/batches          batch summaries, newest first
/// /users/{user_id}/history          generation history, newest first
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint.
        .route("/ws/jobs/{job_id}", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
        .nest("/batches", batches::router())
        .nest("/users", users::router())
}
