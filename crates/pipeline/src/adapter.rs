//! The adapter trait every generation pipeline implements.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use vimax_core::generation::{GenerationRequest, PipelineKind, Uploads};
use vimax_core::types::JobId;

use crate::error::PipelineError;

/// Everything a pipeline receives for one job.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRequest {
    pub job_id: JobId,
    pub kind: PipelineKind,
    pub request: GenerationRequest,
    pub uploads: Uploads,
    /// Directory the pipeline may write intermediate and final files into.
    pub output_dir: PathBuf,
}

/// The produced video, somewhere on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// An opaque, long-running generation pipeline.
///
/// Implementations must be safe to call concurrently for different jobs.
#[async_trait]
pub trait PipelineAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn invoke(&self, request: &PipelineRequest) -> Result<Artifact, PipelineError>;
}
