//! Subprocess dispatch behind a narrow capability seam.
//!
//! Workspace logic never names `tokio::process` directly; it speaks to a
//! [`CommandRunner`], so tests substitute a scripted fake
//! ([`crate::fakes::ScriptedRunner`]) and never touch real version-control
//! or build tooling.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Subprocess invocation failure.
///
/// A non-zero exit status is NOT an error here; it is reported through
/// [`CommandOutput::exit_code`] and interpreted by the caller.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("i/o failure waiting for {program}: {message}")]
    Io { program: String, message: String },
}

/// Captured outcome of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by signal).
    pub exit_code: i32,

    /// Whether the process exited with status zero.
    pub success: bool,

    /// Raw standard output. Kept as bytes: the test-runner stream is parsed
    /// byte-wise and may contain invalid UTF-8.
    pub stdout: Vec<u8>,

    /// Standard error, lossily decoded for diagnostics.
    pub stderr: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// Narrow capability for running external tools.
///
/// `timeout_secs == 0` disables the wall-clock bound.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout_secs: u64,
    ) -> Result<CommandOutput, CommandError>;
}

/// Production runner backed by `tokio::process`.
///
/// A timed-out child is killed (`kill_on_drop`), so cancellation never
/// leaves a half-running process mutating the workspace behind a following
/// reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout_secs: u64,
    ) -> Result<CommandOutput, CommandError> {
        let start = Instant::now();
        debug!(program, ?args, cwd = %cwd.display(), timeout_secs, "running command");

        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        let output = if timeout_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    return Err(CommandError::Timeout {
                        program: program.to_string(),
                        timeout_secs,
                    });
                }
            }
        } else {
            child.wait_with_output().await
        }
        .map_err(|e| CommandError::Io {
            program: program.to_string(),
            message: e.to_string(),
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
