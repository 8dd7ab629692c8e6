//! Job orchestrator: drives one job from admission to a terminal state.
//!
//! A job is admitted (cache check plus initial record), then walks the five
//! fixed steps. Every step transition is persisted before it is pushed to
//! subscribers. Any failure inside the run ends in a `failed` record; the
//! caller always gets a [`JobOutcome`] back, never an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use vimax_core::error::CoreError;
use vimax_core::fingerprint::fingerprint;
use vimax_core::generation::JobSpec;
use vimax_core::history::HistoryEntry;
use vimax_core::job_status::{
    JobStatusRecord, STEP_ASSEMBLY, STEP_FINALIZE, STEP_IMAGES, TOTAL_STEPS,
};
use vimax_core::types::{new_job_id, Timestamp};
use vimax_db::repositories::{HistoryRepo, JobStatusRepo};
use vimax_db::DbPool;
use vimax_pipeline::{Artifact, PipelineError, PipelineRegistry, PipelineRequest};

use crate::engine::cache::CacheIndex;
use crate::engine::error::{EngineError, StorageError};
use crate::ws::ConnectionManager;

/// URL prefix under which per-job output directories are served.
pub const VIDEOS_URL_PREFIX: &str = "/videos";

/// Base name of the artifact placed in a job's output directory.
const FINAL_VIDEO_STEM: &str = "final_video";

/// Result of running one job to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { video_url: String, cached: bool },
    Failed { error: String },
}

/// Errors that end a running job. Recorded on the job, not propagated.
#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Artifact check failed: {0}")]
    Artifact(String),

    #[error(transparent)]
    State(#[from] CoreError),
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(StorageError::Io(err))
    }
}

/// How a job left admission.
enum Admitted {
    /// Served from the cache; already terminal.
    Cached(JobStatusRecord),
    /// Initial record written; steps still to run.
    Fresh(JobStatusRecord),
}

pub struct JobOrchestrator {
    pool: DbPool,
    cache: Arc<CacheIndex>,
    pipelines: PipelineRegistry,
    connections: Arc<ConnectionManager>,
    videos_dir: PathBuf,
}

impl JobOrchestrator {
    pub fn new(
        pool: DbPool,
        cache: Arc<CacheIndex>,
        pipelines: PipelineRegistry,
        connections: Arc<ConnectionManager>,
        videos_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pool,
            cache,
            pipelines,
            connections,
            videos_dir: videos_dir.into(),
        }
    }

    /// Admit a job and run the rest of it as an independent task.
    ///
    /// Returns the record as of admission: `completed` with `cached = true`
    /// on a cache hit, otherwise the initial `processing` record.
    pub async fn submit(self: &Arc<Self>, spec: JobSpec) -> Result<JobStatusRecord, EngineError> {
        spec.validate()?;
        let job_id = new_job_id();

        match self.admit(&job_id, &spec, None).await? {
            Admitted::Cached(record) => Ok(record),
            Admitted::Fresh(record) => {
                let this = Arc::clone(self);
                let initial = record.clone();
                tokio::spawn(async move {
                    this.drive(record, spec).await;
                });
                Ok(initial)
            }
        }
    }

    /// Run a job to a terminal state under a caller-chosen id.
    pub async fn run(&self, job_id: &str, spec: JobSpec) -> JobOutcome {
        if let Err(e) = spec.validate() {
            return JobOutcome::Failed {
                error: e.to_string(),
            };
        }

        // A batch job rerun after a restart keeps its original creation time.
        let created_at = match JobStatusRepo::find(&self.pool, job_id).await {
            Ok(previous) => previous.map(|r| r.created_at),
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Could not read previous record");
                None
            }
        };

        match self.admit(job_id, &spec, created_at).await {
            Ok(Admitted::Cached(record)) => JobOutcome::Completed {
                video_url: record.video_url.unwrap_or_default(),
                cached: true,
            },
            Ok(Admitted::Fresh(record)) => self.drive(record, spec).await,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job admission failed");
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    async fn admit(
        &self,
        job_id: &str,
        spec: &JobSpec,
        created_at: Option<Timestamp>,
    ) -> Result<Admitted, EngineError> {
        if spec.is_cacheable() {
            let key = fingerprint(&spec.request.cache_params());
            match self.cache.lookup(&key).await {
                Ok(Some(hit)) => {
                    let mut record = JobStatusRecord::completed_from_cache(
                        job_id,
                        spec.user_id.clone(),
                        hit.url(),
                    );
                    if let Some(created_at) = created_at {
                        record.created_at = created_at;
                    }
                    self.persist_and_push(&record).await?;
                    self.record_history(&record, spec).await;
                    tracing::info!(job_id = %job_id, cache_key = %key, "Job served from cache");
                    return Ok(Admitted::Cached(record));
                }
                Ok(None) => {
                    tracing::debug!(job_id = %job_id, cache_key = %key, "Cache miss");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Cache lookup failed, generating");
                }
            }
        }

        let mut record =
            JobStatusRecord::new_processing(job_id, spec.user_id.clone(), spec.uploads.clone());
        if let Some(created_at) = created_at {
            record.created_at = created_at;
        }
        self.persist_and_push(&record).await?;
        tracing::info!(
            job_id = %job_id,
            pipeline = %spec.request.pipeline_type,
            user_id = ?spec.user_id,
            "Job admitted",
        );
        Ok(Admitted::Fresh(record))
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    async fn drive(&self, mut record: JobStatusRecord, spec: JobSpec) -> JobOutcome {
        let started = Instant::now();
        let job_id = record.job_id.clone();

        let final_path = match self.execute_steps(&mut record, &spec).await {
            Ok(path) => path,
            Err(e) => return self.fail(record, e.to_string(), started).await,
        };

        let video_url = match final_path.file_name().and_then(|n| n.to_str()) {
            Some(file_name) => format!("{VIDEOS_URL_PREFIX}/{job_id}/{file_name}"),
            None => {
                let error = format!("Invalid artifact path {}", final_path.display());
                return self.fail(record, error, started).await;
            }
        };

        let mut completed = record.clone();
        if let Err(e) = completed.complete(video_url.clone()) {
            return self.fail(record, e.to_string(), started).await;
        }

        // Stored, then cached and recorded, then pushed. A job whose
        // terminal write fails leaves no cache entry or history behind.
        if let Err(e) = JobStatusRepo::put(&self.pool, &completed).await {
            return self.fail(record, StorageError::from(e).to_string(), started).await;
        }
        if spec.is_cacheable() {
            let params = spec.request.cache_params();
            let key = fingerprint(&params);
            if let Err(e) = self.cache.insert(&key, &final_path, &params).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to cache artifact");
            }
        }
        self.record_history(&completed, &spec).await;
        self.connections.push(&completed).await;

        tracing::info!(
            job_id = %job_id,
            outcome = "completed",
            duration_ms = started.elapsed().as_millis() as u64,
            "Job finished",
        );
        JobOutcome::Completed {
            video_url,
            cached: false,
        }
    }

    /// Walk the five steps. Returns the artifact's final location.
    async fn execute_steps(
        &self,
        record: &mut JobStatusRecord,
        spec: &JobSpec,
    ) -> Result<PathBuf, JobError> {
        let output_dir = self.videos_dir.join(&record.job_id);
        let mut artifact: Option<Artifact> = None;
        let mut final_path: Option<PathBuf> = None;

        for index in 0..TOTAL_STEPS {
            record.begin_step(index)?;
            self.persist_and_push(record).await?;

            match index {
                STEP_IMAGES => {
                    tokio::fs::create_dir_all(&output_dir).await?;
                    let request = PipelineRequest {
                        job_id: record.job_id.clone(),
                        kind: spec.request.pipeline_type,
                        request: spec.request.clone(),
                        uploads: spec.uploads.clone(),
                        output_dir: output_dir.clone(),
                    };
                    artifact = Some(self.pipelines.invoke(&request).await?);
                }
                STEP_ASSEMBLY => {
                    let produced = artifact
                        .as_ref()
                        .ok_or_else(|| JobError::Artifact("pipeline returned nothing".into()))?;
                    verify_artifact(&produced.path).await?;
                }
                STEP_FINALIZE => {
                    let produced = artifact
                        .as_ref()
                        .ok_or_else(|| JobError::Artifact("pipeline returned nothing".into()))?;
                    let ext = produced
                        .path
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or(spec.request.format.extension());
                    let target = output_dir.join(format!("{FINAL_VIDEO_STEM}.{ext}"));
                    place_artifact(&produced.path, &target).await?;
                    final_path = Some(target);
                }
                _ => {}
            }

            record.complete_step(index)?;
        }

        final_path.ok_or_else(|| JobError::Artifact("no artifact was placed".into()))
    }

    async fn fail(&self, mut record: JobStatusRecord, error: String, started: Instant) -> JobOutcome {
        let job_id = record.job_id.clone();
        match record.fail(error.clone()) {
            Ok(()) => {
                if let Err(e) = self.persist_and_push(&record).await {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to record job failure");
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job already terminal");
            }
        }

        tracing::warn!(
            job_id = %job_id,
            outcome = "failed",
            error = %error,
            step = ?record.current_step,
            duration_ms = started.elapsed().as_millis() as u64,
            "Job finished",
        );
        JobOutcome::Failed { error }
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    /// Durable write first, then delivery. Delivery never fails.
    async fn persist_and_push(&self, record: &JobStatusRecord) -> Result<(), StorageError> {
        JobStatusRepo::put(&self.pool, record).await?;
        self.connections.push(record).await;
        Ok(())
    }

    async fn record_history(&self, record: &JobStatusRecord, spec: &JobSpec) {
        let (Some(user_id), Some(video_url)) = (&spec.user_id, &record.video_url) else {
            return;
        };
        let entry = HistoryEntry::completed(record.job_id.clone(), &spec.request, video_url.clone());
        if let Err(e) = HistoryRepo::append(&self.pool, user_id, &entry).await {
            tracing::warn!(job_id = %record.job_id, error = %e, "Failed to append history");
        }
    }
}

/// The pipeline's output must exist and be non-empty.
async fn verify_artifact(path: &Path) -> Result<(), JobError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(JobError::Artifact(format!(
            "{} is empty or not a file",
            path.display()
        ))),
        Err(e) => Err(JobError::Artifact(format!("{}: {e}", path.display()))),
    }
}

/// Move `from` to `to`, copying when a rename is not possible.
async fn place_artifact(from: &Path, to: &Path) -> std::io::Result<()> {
    if from == to {
        return Ok(());
    }
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    Ok(())
}
