use axum::extract::State;
use axum::Json;

use crate::engine::metrics::EngineMetrics;
use crate::error::AppResult;
use crate::state::AppState;

/// GET /metrics
///
/// Jobs by status, cache size, batch queue depth, and live subscribers.
pub async fn get_metrics(State(state): State<AppState>) -> AppResult<Json<EngineMetrics>> {
    Ok(Json(state.service.metrics().await?))
}
