//! The generation engine as one object: what the HTTP layer talks to.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vimax_core::batch::{BatchRecord, BatchSummary};
use vimax_core::error::CoreError;
use vimax_core::generation::{GenerationRequest, JobSpec};
use vimax_core::history::HistoryEntry;
use vimax_core::job_status::JobStatusRecord;
use vimax_db::repositories::{BatchRepo, HistoryRepo, JobStatusRepo};
use vimax_db::DbPool;
use vimax_pipeline::PipelineRegistry;

use crate::engine::cache::{CacheIndex, CACHE_URL_PREFIX};
use crate::engine::error::{EngineError, StorageError};
use crate::engine::metrics::{self, EngineMetrics};
use crate::engine::orchestrator::{JobOrchestrator, VIDEOS_URL_PREFIX};
use crate::engine::scheduler::BatchScheduler;
use crate::ws::ConnectionManager;

/// Knobs for [`GenerationService::new`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub videos_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_ttl: chrono::Duration,
    pub max_concurrent_batches: usize,
    pub heartbeat_interval: Duration,
}

pub struct GenerationService {
    pool: DbPool,
    settings: EngineSettings,
    cache: Arc<CacheIndex>,
    connections: Arc<ConnectionManager>,
    orchestrator: Arc<JobOrchestrator>,
    scheduler: Arc<BatchScheduler>,
}

impl GenerationService {
    pub fn new(pool: DbPool, pipelines: PipelineRegistry, settings: EngineSettings) -> Self {
        let cache = Arc::new(CacheIndex::new(
            pool.clone(),
            settings.cache_dir.clone(),
            settings.cache_ttl,
        ));
        let connections = Arc::new(ConnectionManager::new(settings.heartbeat_interval));
        let orchestrator = Arc::new(JobOrchestrator::new(
            pool.clone(),
            Arc::clone(&cache),
            pipelines,
            Arc::clone(&connections),
            settings.videos_dir.clone(),
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            pool.clone(),
            Arc::clone(&orchestrator),
            settings.max_concurrent_batches,
        ));

        Self {
            pool,
            settings,
            cache,
            connections,
            orchestrator,
            scheduler,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> Arc<CacheIndex> {
        Arc::clone(&self.cache)
    }

    pub fn connections(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.connections)
    }

    /// Prepare storage and pick up work left by a previous run.
    ///
    /// Creates the output directories, drops expired cache entries, and
    /// re-enqueues unfinished batches.
    pub async fn start(&self) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&self.settings.videos_dir)
            .await
            .map_err(StorageError::from)?;
        tokio::fs::create_dir_all(&self.settings.cache_dir)
            .await
            .map_err(StorageError::from)?;

        match self.cache.sweep().await {
            Ok(evicted) => tracing::info!(evicted, "Startup cache sweep finished"),
            Err(e) => tracing::warn!(error = %e, "Startup cache sweep failed"),
        }

        let recovered = self.scheduler.recover().await?;
        if recovered > 0 {
            tracing::info!(recovered, "Re-enqueued unfinished batches");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    pub async fn submit_job(&self, spec: JobSpec) -> Result<JobStatusRecord, EngineError> {
        self.orchestrator.submit(spec).await
    }

    /// A read failure is logged and reported as not found.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusRecord, EngineError> {
        match JobStatusRepo::find(&self.pool, job_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(not_found("Job", job_id)),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Status store read failed");
                Err(not_found("Job", job_id))
            }
        }
    }

    /// Local file behind a job's `video_url`, under the videos or cache
    /// directory. Not found when the job has no video or the file is gone.
    pub async fn video_file(&self, record: &JobStatusRecord) -> Result<PathBuf, EngineError> {
        let missing = || not_found("Video", &record.job_id);
        let url = record.video_url.as_deref().ok_or_else(missing)?;
        let path = resolve_video_url(url, &self.settings.videos_dir, &self.settings.cache_dir)
            .ok_or_else(missing)?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => {
                tracing::warn!(job_id = %record.job_id, path = %path.display(), "Video file missing");
                Err(missing())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    pub async fn submit_batch(
        &self,
        user_id: &str,
        name: Option<String>,
        jobs: Vec<GenerationRequest>,
    ) -> Result<BatchRecord, EngineError> {
        self.scheduler.submit(user_id, name, jobs).await
    }

    /// A read failure is logged and reported as not found.
    pub async fn batch(&self, batch_id: &str) -> Result<BatchRecord, EngineError> {
        match BatchRepo::find(&self.pool, batch_id).await {
            Ok(Some(batch)) => Ok(batch),
            Ok(None) => Err(not_found("Batch", batch_id)),
            Err(e) => {
                tracing::error!(batch_id = %batch_id, error = %e, "Batch store read failed");
                Err(not_found("Batch", batch_id))
            }
        }
    }

    /// A user's batches, newest first.
    pub async fn user_batches(&self, user_id: &str) -> Result<Vec<BatchSummary>, EngineError> {
        let batches = BatchRepo::list_by_user(&self.pool, user_id).await?;
        Ok(batches.iter().map(BatchRecord::summary).collect())
    }

    /// A user's generation history, newest first.
    pub async fn user_history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(HistoryRepo::list_for_user(&self.pool, user_id).await?)
    }

    pub async fn metrics(&self) -> Result<EngineMetrics, EngineError> {
        metrics::collect(&self.pool, &self.cache, &self.scheduler, &self.connections).await
    }
}

/// Map a served video URL back to its file. Only plain relative paths under
/// one of the two served prefixes resolve.
fn resolve_video_url(url: &str, videos_dir: &Path, cache_dir: &Path) -> Option<PathBuf> {
    let (root, rest) = if let Some(rest) = url.strip_prefix(VIDEOS_URL_PREFIX) {
        (videos_dir, rest)
    } else if let Some(rest) = url.strip_prefix(CACHE_URL_PREFIX) {
        (cache_dir, rest)
    } else {
        return None;
    };

    let relative = Path::new(rest.strip_prefix('/')?);
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (plain && relative.components().next().is_some()).then(|| root.join(relative))
}

fn not_found(entity: &'static str, id: &str) -> EngineError {
    EngineError::Core(CoreError::NotFound {
        entity,
        id: id.to_string(),
    })
}
