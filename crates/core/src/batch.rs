//! Batch records: a named group of up to ten generation jobs that run
//! sequentially under one batch slot.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::generation::{GenerationRequest, JobSpec};
use crate::types::{new_batch_id, BatchId, JobId, Timestamp, UserId};

pub const MIN_JOBS_PER_BATCH: usize = 1;
pub const MAX_JOBS_PER_BATCH: usize = 10;

/// Default number of batches allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Processing,
    Completed,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn processed(&self) -> usize {
        self.completed + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobStatus {
    Completed,
    Failed,
}

/// Outcome of one job inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobResult {
    pub job_index: usize,
    pub job_id: JobId,
    pub status: BatchJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchJobResult {
    pub fn completed(job_index: usize, job_id: impl Into<JobId>, video_url: impl Into<String>) -> Self {
        Self {
            job_index,
            job_id: job_id.into(),
            status: BatchJobStatus::Completed,
            video_url: Some(video_url.into()),
            error: None,
        }
    }

    pub fn failed(job_index: usize, job_id: impl Into<JobId>, error: impl Into<String>) -> Self {
        Self {
            job_index,
            job_id: job_id.into(),
            status: BatchJobStatus::Failed,
            video_url: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: BatchId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    pub jobs: Vec<GenerationRequest>,
    pub status: BatchStatus,
    pub progress: BatchProgress,
    pub results: Vec<BatchJobResult>,
}

/// Listing row for a user's batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub name: String,
    pub status: BatchStatus,
    pub created_at: Timestamp,
    pub progress: BatchProgress,
    pub total_jobs: usize,
}

impl BatchRecord {
    /// Validate and build a queued batch. Nothing is persisted here.
    pub fn new(
        user_id: impl Into<UserId>,
        name: Option<String>,
        jobs: Vec<GenerationRequest>,
    ) -> Result<Self, CoreError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(CoreError::Validation("'user_id' must not be empty".to_string()));
        }
        validate_batch_jobs(&jobs)?;

        let now = Utc::now();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_batch_name(now));

        Ok(Self {
            batch_id: new_batch_id(),
            user_id,
            name,
            created_at: now,
            started_at: None,
            completed_at: None,
            progress: BatchProgress {
                total: jobs.len(),
                ..BatchProgress::default()
            },
            jobs,
            status: BatchStatus::Queued,
            results: Vec::new(),
        })
    }

    pub fn mark_processing(&mut self) -> Result<(), CoreError> {
        if self.status != BatchStatus::Queued {
            return Err(CoreError::Conflict(format!(
                "Batch {} cannot start from status {}",
                self.batch_id,
                self.status.as_str()
            )));
        }
        self.status = BatchStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Index of the next job to run, or `None` once every job has a result.
    pub fn next_job_index(&self) -> Option<usize> {
        let next = self.results.len();
        (next < self.jobs.len()).then_some(next)
    }

    /// Append the result of the next job and update counters.
    pub fn record_result(&mut self, result: BatchJobResult) -> Result<(), CoreError> {
        if self.status != BatchStatus::Processing {
            return Err(CoreError::Conflict(format!(
                "Batch {} is not processing",
                self.batch_id
            )));
        }
        if self.next_job_index() != Some(result.job_index) {
            return Err(CoreError::Conflict(format!(
                "Batch {} expected result for job {:?}, got {}",
                self.batch_id,
                self.next_job_index(),
                result.job_index
            )));
        }

        match result.status {
            BatchJobStatus::Completed => self.progress.completed += 1,
            BatchJobStatus::Failed => self.progress.failed += 1,
        }
        self.results.push(result);
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), CoreError> {
        if self.status != BatchStatus::Processing || self.next_job_index().is_some() {
            return Err(CoreError::Conflict(format!(
                "Batch {} still has unprocessed jobs",
                self.batch_id
            )));
        }
        self.status = BatchStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_id: self.batch_id.clone(),
            name: self.name.clone(),
            status: self.status,
            created_at: self.created_at,
            progress: self.progress,
            total_jobs: self.jobs.len(),
        }
    }
}

/// Check job count bounds and every job's shape.
pub fn validate_batch_jobs(jobs: &[GenerationRequest]) -> Result<(), CoreError> {
    if !(MIN_JOBS_PER_BATCH..=MAX_JOBS_PER_BATCH).contains(&jobs.len()) {
        return Err(CoreError::Validation(format!(
            "Batch must contain between {MIN_JOBS_PER_BATCH} and {MAX_JOBS_PER_BATCH} jobs (got {})",
            jobs.len()
        )));
    }

    for (index, job) in jobs.iter().enumerate() {
        JobSpec::new(job.clone()).validate().map_err(|e| match e {
            CoreError::Validation(msg) => CoreError::Validation(format!("Job {index}: {msg}")),
            other => other,
        })?;
    }
    Ok(())
}

pub fn default_batch_name(now: Timestamp) -> String {
    format!("Batch {}", now.format("%Y-%m-%d %H:%M"))
}
