//! Subprocess-backed pipeline adapter.
//!
//! Runs an external program per job: the [`PipelineRequest`] is written to
//! the child's stdin as JSON, and the last non-empty stdout line names the
//! produced artifact. Relative artifact paths resolve against the job's
//! output directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::adapter::{Artifact, PipelineAdapter, PipelineRequest};
use crate::error::PipelineError;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Stderr longer than this is trimmed in error messages.
const MAX_ERROR_CHARS: usize = 2000;

/// Environment variables exposed to the child.
pub const ENV_JOB_ID: &str = "VIMAX_JOB_ID";
pub const ENV_OUTPUT_DIR: &str = "VIMAX_OUTPUT_DIR";
pub const ENV_PIPELINE: &str = "VIMAX_PIPELINE";

#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandPipeline {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Parse a whitespace-separated command line. Returns `None` when blank.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PipelineAdapter for CommandPipeline {
    fn name(&self) -> &str {
        &self.program
    }

    async fn invoke(&self, request: &PipelineRequest) -> Result<Artifact, PipelineError> {
        let kind = request.kind.backing();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(kind.as_str())
            .env(ENV_JOB_ID, &request.job_id)
            .env(ENV_OUTPUT_DIR, &request.output_dir)
            .env(ENV_PIPELINE, kind.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let payload = serde_json::to_vec(request)
            .map_err(|e| PipelineError::Failed(format!("Cannot encode request: {e}")))?;

        let start = Instant::now();
        let mut child = cmd.spawn()?;

        // Readers and the stdin writer run alongside the wait, so a child
        // that writes before reading (or never reads) cannot stall us.
        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
        let stdin_task = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                // The pipeline may exit without reading its input.
                let _ = stdin.write_all(&payload).await;
            })
        });

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await,
            None => Ok(child.wait().await),
        };
        if let Some(task) = stdin_task {
            task.abort();
        }
        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                // Dropping `child` kills the process.
                stdout_task.abort();
                stderr_task.abort();
                return Err(PipelineError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

        tracing::debug!(
            job_id = %request.job_id,
            pipeline = %kind,
            exit_code = ?status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Pipeline process exited",
        );

        if !status.success() {
            let detail = truncate(stderr.trim(), MAX_ERROR_CHARS);
            return Err(PipelineError::Failed(match status.code() {
                Some(code) => format!("exit code {code}: {detail}"),
                None => format!("terminated by signal: {detail}"),
            }));
        }

        artifact_from_stdout(&stdout, &request.output_dir)
    }
}

/// Resolve the artifact path printed on the last non-empty stdout line.
fn artifact_from_stdout(stdout: &str, output_dir: &Path) -> Result<Artifact, PipelineError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| PipelineError::InvalidOutput("no artifact path on stdout".to_string()))?;

    let path = PathBuf::from(line);
    let path = if path.is_absolute() {
        path
    } else {
        output_dir.join(path)
    };
    Ok(Artifact::new(path))
}

/// Capture up to [`MAX_OUTPUT_BYTES`], then discard the rest so the child
/// never blocks on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
