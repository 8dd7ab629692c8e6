use axum::routing::get;
use axum::Router;

use crate::handlers::metrics;
use crate::state::AppState;

/// Mount the metrics snapshot at root level.
pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics::get_metrics))
}
