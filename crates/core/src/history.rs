//! Per-user generation history.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::generation::{GenerationRequest, PipelineKind, Quality};
use crate::job_status::JobState;
use crate::types::{JobId, Timestamp};

/// Only the most recent entries per user are kept.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub job_id: JobId,
    pub timestamp: Timestamp,
    pub pipeline_type: PipelineKind,
    pub idea: String,
    pub style: String,
    pub quality: Quality,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl HistoryEntry {
    /// Entry for a job that finished successfully.
    pub fn completed(job_id: impl Into<JobId>, request: &GenerationRequest, video_url: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            pipeline_type: request.pipeline_type,
            idea: request.idea.clone(),
            style: request.style.clone(),
            quality: request.quality,
            status: JobState::Completed,
            video_url: Some(video_url.into()),
        }
    }
}
