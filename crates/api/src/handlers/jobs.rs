//! Handlers for the `/jobs` resource.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use vimax_core::generation::{GenerationRequest, JobSpec, Uploads};
use vimax_core::job_status::{JobState, JobStatusRecord};
use vimax_core::types::{JobId, UserId};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /jobs`: the generation parameters plus optional owner and
/// pre-validated upload paths.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(flatten)]
    pub request: GenerationRequest,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub uploads: Uploads,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobState,
    pub message: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl From<JobStatusRecord> for SubmitJobResponse {
    fn from(record: JobStatusRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            message: record.message,
            cached: record.cached,
            video_url: record.video_url,
        }
    }
}

/// POST /api/v1/jobs
///
/// Admit a generation job. Returns 201 with the admission snapshot: either
/// `processing` with the job running in the background, or `completed`
/// with `cached: true` when an identical request was served from the cache.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;

    let mut spec = JobSpec::new(input.request).with_uploads(input.uploads);
    if let Some(user_id) = input.user_id.filter(|u| !u.trim().is_empty()) {
        spec = spec.with_user(user_id);
    }

    let record = state.service.submit_job(spec).await?;

    tracing::info!(
        job_id = %record.job_id,
        status = record.status.as_str(),
        cached = record.cached,
        "Job submitted",
    );

    Ok((StatusCode::CREATED, Json(SubmitJobResponse::from(record))))
}

/// GET /api/v1/jobs/{job_id}
///
/// Full status record, or 404.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobStatusRecord>> {
    let record = state.service.job_status(&job_id).await?;
    Ok(Json(record))
}

/// GET /api/v1/jobs/{job_id}/download
///
/// The finished video as an attachment named `vimax_video_{job_id}.{ext}`.
/// 404 for an unknown job or a missing file, 400 while the job has not
/// completed.
pub async fn download_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let record = state.service.job_status(&job_id).await?;
    if record.status != JobState::Completed {
        return Err(AppError::BadRequest("Video not ready yet".into()));
    }

    let path = state.service.video_file(&record).await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
    let disposition = format!("attachment; filename=\"vimax_video_{job_id}.{ext}\"");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for_extension(ext))
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}
