//! Point-in-time counters for the `/metrics` endpoint.

use serde::Serialize;
use vimax_core::error::CoreError;
use vimax_db::models::cache_entry::CacheStats;
use vimax_db::models::job_status::JobStatusCounts;
use vimax_db::repositories::JobStatusRepo;
use vimax_db::DbPool;

use crate::engine::cache::{CacheError, CacheIndex};
use crate::engine::error::{EngineError, StorageError};
use crate::engine::scheduler::{BatchScheduler, SchedulerLoad};
use crate::ws::ConnectionManager;

#[derive(Debug, Clone, Serialize)]
pub struct EngineMetrics {
    pub jobs: JobStatusCounts,
    pub cache: CacheStats,
    pub batches: SchedulerLoad,
    /// Live WebSocket subscribers.
    pub connections: usize,
}

pub async fn collect(
    pool: &DbPool,
    cache: &CacheIndex,
    scheduler: &BatchScheduler,
    connections: &ConnectionManager,
) -> Result<EngineMetrics, EngineError> {
    let jobs = JobStatusRepo::count_by_status(pool).await?;
    let cache = cache.stats().await.map_err(storage_error)?;

    Ok(EngineMetrics {
        jobs,
        cache,
        batches: scheduler.load(),
        connections: connections.connection_count().await,
    })
}

fn storage_error(err: CacheError) -> EngineError {
    match err {
        CacheError::Database(e) => StorageError::Database(e).into(),
        CacheError::Io(e) => StorageError::Io(e).into(),
        CacheError::EmptyArtifact(path) => {
            CoreError::Internal(format!("empty artifact {}", path.display())).into()
        }
    }
}
