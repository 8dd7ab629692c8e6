//! Fake pipelines and an in-memory engine harness for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use vimax_core::generation::PipelineKind;
use vimax_db::DbPool;
use vimax_pipeline::{Artifact, PipelineAdapter, PipelineError, PipelineRegistry, PipelineRequest};

use crate::engine::cache::CacheIndex;
use crate::engine::orchestrator::JobOrchestrator;
use crate::ws::ConnectionManager;

/// Writes a small file into the job's output directory.
#[derive(Default)]
pub struct WritingPipeline {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl WritingPipeline {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineAdapter for WritingPipeline {
    fn name(&self) -> &str {
        "writing"
    }

    async fn invoke(&self, request: &PipelineRequest) -> Result<Artifact, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let path = request.output_dir.join("render.mp4");
        let result = tokio::fs::write(&path, b"fake video bytes").await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;
        Ok(Artifact::new(path))
    }
}

/// Always fails with the given message.
pub struct FailingPipeline(pub &'static str);

#[async_trait]
impl PipelineAdapter for FailingPipeline {
    fn name(&self) -> &str {
        "failing"
    }

    async fn invoke(&self, _request: &PipelineRequest) -> Result<Artifact, PipelineError> {
        Err(PipelineError::Failed(self.0.to_string()))
    }
}

/// Reports success but leaves a zero-byte file.
pub struct EmptyPipeline;

#[async_trait]
impl PipelineAdapter for EmptyPipeline {
    fn name(&self) -> &str {
        "empty"
    }

    async fn invoke(&self, request: &PipelineRequest) -> Result<Artifact, PipelineError> {
        let path = request.output_dir.join("render.mp4");
        tokio::fs::write(&path, b"").await?;
        Ok(Artifact::new(path))
    }
}

/// Registry serving every pipeline kind from one adapter.
pub fn registry_with(adapter: Arc<dyn PipelineAdapter>) -> PipelineRegistry {
    PipelineRegistry::new()
        .with(PipelineKind::Idea2Video, Arc::clone(&adapter))
        .with(PipelineKind::Script2Video, adapter)
}

pub struct Harness {
    pub pool: DbPool,
    pub cache: Arc<CacheIndex>,
    pub connections: Arc<ConnectionManager>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub dir: TempDir,
}

pub async fn harness(pipelines: PipelineRegistry) -> Harness {
    let pool = vimax_db::memory_pool().await.expect("memory pool");
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = Arc::new(CacheIndex::new(
        pool.clone(),
        dir.path().join("cache"),
        chrono::Duration::days(7),
    ));
    let connections = Arc::new(ConnectionManager::new(Duration::from_secs(30)));
    let orchestrator = Arc::new(JobOrchestrator::new(
        pool.clone(),
        Arc::clone(&cache),
        pipelines,
        Arc::clone(&connections),
        dir.path().join("videos"),
    ));
    Harness {
        pool,
        cache,
        connections,
        orchestrator,
        dir,
    }
}
