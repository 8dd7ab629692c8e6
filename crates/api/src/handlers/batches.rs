//! Handlers for the `/batches` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use vimax_core::batch::{BatchRecord, BatchStatus};
use vimax_core::generation::GenerationRequest;
use vimax_core::types::{BatchId, UserId};

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    pub jobs: Vec<GenerationRequest>,
}

#[derive(Debug, Serialize)]
pub struct SubmitBatchResponse {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub message: String,
}

/// POST /api/v1/batches
///
/// Validate and queue a batch of 1 to 10 jobs. Returns 201; nothing is
/// stored when validation fails.
pub async fn submit_batch(
    State(state): State<AppState>,
    payload: Result<Json<SubmitBatchRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;

    let batch = state
        .service
        .submit_batch(&input.user_id, input.name, input.jobs)
        .await?;

    let response = SubmitBatchResponse {
        message: format!("Batch '{}' queued with {} jobs", batch.name, batch.jobs.len()),
        batch_id: batch.batch_id,
        status: batch.status,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/batches/{batch_id}
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<Json<BatchRecord>> {
    let batch = state.service.batch(&batch_id).await?;
    Ok(Json(batch))
}
