//! External tool invocation.
//!
//! [`ToolRunner`] is the seam between the pipeline and ffmpeg/ffprobe: run a program with
//! arguments in a working directory, optionally under a hard deadline, and hand back the exit
//! status and captured output. [`ProcessRunner`] is the real implementation; tests substitute
//! their own.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;
/// ffprobe JSON for a single file is tiny; anything past this is dropped.
const MAX_STDOUT_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Hard wall-clock limit. On expiry the process is killed and reaped.
    pub deadline: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            deadline: None,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as child processes on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let program = invocation.program.to_string_lossy().to_string();
        log::debug!(
            target: "thumby::ffmpeg::runner",
            "Spawning {}: args={:?}, deadline={:?}",
            program,
            invocation.args,
            invocation.deadline
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = invocation.cwd {
            cmd.current_dir(cwd);
        }
        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout_handle = child
            .stdout
            .take()
            .map(|s| tokio::spawn(read_head(s, MAX_STDOUT_BYTES)));
        let stderr_handle = child
            .stderr
            .take()
            .map(|s| tokio::spawn(read_tail(s, MAX_STDERR_BYTES)));

        let status = match invocation.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    log::warn!(
                        target: "thumby::ffmpeg::runner",
                        "{} exceeded {:?}, killing pid {:?}",
                        program,
                        deadline,
                        child.id()
                    );
                    // kill() also waits, so the process is reaped before we return.
                    if let Err(e) = child.kill().await {
                        log::error!(
                            target: "thumby::ffmpeg::runner",
                            "failed to kill {}: {}",
                            program,
                            e
                        );
                    }
                    abort_reader(stdout_handle);
                    abort_reader(stderr_handle);
                    return Err(ToolError::TimedOut(deadline));
                }
            },
            None => child.wait().await?,
        };

        let stdout = join_reader(stdout_handle).await;
        let stderr = String::from_utf8_lossy(&join_reader(stderr_handle).await).to_string();
        let output = ToolOutput {
            code: status.code(),
            stdout,
            stderr,
        };

        if output.success() {
            log::debug!(
                target: "thumby::ffmpeg::runner",
                "{} completed successfully",
                program
            );
        } else {
            let err_preview = output
                .stderr
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .join("; ");
            log::debug!(
                target: "thumby::ffmpeg::runner",
                "{} failed (code={:?}): {}",
                program,
                output.code,
                err_preview
            );
        }
        Ok(output)
    }
}

async fn read_head<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(collected.len());
                collected.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    collected
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                collected.extend_from_slice(&chunk[..n]);
                if collected.len() > limit {
                    let excess = collected.len() - limit;
                    collected.drain(..excess);
                }
            }
        }
    }
    collected
}

async fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match handle {
        Some(h) => h.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

fn abort_reader(handle: Option<JoinHandle<Vec<u8>>>) {
    if let Some(h) = handle {
        h.abort();
    }
}
