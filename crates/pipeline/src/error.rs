use vimax_core::generation::PipelineKind;

/// Failure of a pipeline invocation. Recorded on the job, never retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No pipeline registered for '{0}'")]
    NotRegistered(PipelineKind),

    #[error("Pipeline failed: {0}")]
    Failed(String),

    #[error("Pipeline timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Pipeline produced no usable artifact: {0}")]
    InvalidOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
