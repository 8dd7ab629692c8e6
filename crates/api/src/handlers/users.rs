//! Per-user listings.

use axum::extract::{Path, State};
use axum::Json;
use vimax_core::batch::BatchSummary;
use vimax_core::history::HistoryEntry;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/v1/users/{user_id}/batches
///
/// Summaries of the user's batches, newest first.
pub async fn list_batches(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<BatchSummary>>> {
    Ok(Json(state.service.user_batches(&user_id).await?))
}

/// GET /api/v1/users/{user_id}/history
///
/// The user's most recent completed generations, newest first.
pub async fn list_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.service.user_history(&user_id).await?))
}
