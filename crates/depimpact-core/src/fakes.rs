//! Scripted fakes for the command seam (testing only)
//!
//! Provides [`ScriptedRunner`], a `CommandRunner` that satisfies the trait
//! contract from a queue of canned responses, so workspace and pipeline
//! logic can be exercised without git or the Go toolchain installed.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::exec::{CommandError, CommandOutput, CommandRunner};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl RecordedCall {
    /// Space-joined command line, convenient for assertions.
    pub fn line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Scripted response for one invocation.
#[derive(Debug)]
pub enum ScriptedResponse {
    Output(CommandOutput),
    Error(CommandError),
}

/// In-memory `CommandRunner` that replays scripted responses in FIFO order
/// and records every invocation. When the script runs dry, remaining calls
/// succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful (exit 0) invocation with the given stdout.
    pub fn push_success(&self, stdout: &[u8]) {
        self.push_exit(0, stdout);
    }

    /// Queue an invocation with an explicit exit code.
    pub fn push_exit(&self, exit_code: i32, stdout: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::Output(Self::output(exit_code, stdout)));
    }

    /// Queue an invocation-level failure (spawn, timeout).
    pub fn push_error(&self, error: CommandError) {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::Error(error));
    }

    /// Everything the subject under test asked this runner to execute.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn output(exit_code: i32, stdout: &[u8]) -> CommandOutput {
        CommandOutput {
            exit_code,
            success: exit_code == 0,
            stdout: stdout.to_vec(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("scripted failure (exit {exit_code})")
            },
            duration_ms: 0,
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        _timeout_secs: u64,
    ) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        });
        match self.responses.lock().unwrap().pop_front() {
            Some(ScriptedResponse::Output(output)) => Ok(output),
            Some(ScriptedResponse::Error(error)) => Err(error),
            None => Ok(Self::output(0, b"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_fifo_order() {
        let runner = ScriptedRunner::new();
        runner.push_exit(1, b"first");
        runner.push_success(b"second");

        let out = runner
            .run("git", &["status".to_string()], Path::new("."), 0)
            .await
            .expect("run failed");
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stdout, b"first");

        let out = runner
            .run("git", &["status".to_string()], Path::new("."), 0)
            .await
            .expect("run failed");
        assert!(out.success);
        assert_eq!(out.stdout, b"second");
    }

    #[tokio::test]
    async fn test_records_calls() {
        let runner = ScriptedRunner::new();
        runner
            .run(
                "go",
                &["test".to_string(), "-json".to_string()],
                Path::new("/tmp/ws"),
                0,
            )
            .await
            .expect("run failed");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].line(), "go test -json");
        assert_eq!(calls[0].cwd, PathBuf::from("/tmp/ws"));
    }

    #[tokio::test]
    async fn test_exhausted_script_defaults_to_success() {
        let runner = ScriptedRunner::new();
        let out = runner
            .run("git", &[], Path::new("."), 0)
            .await
            .expect("run failed");
        assert!(out.success);
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_error_surfaces() {
        let runner = ScriptedRunner::new();
        runner.push_error(CommandError::Timeout {
            program: "go".to_string(),
            timeout_secs: 1,
        });
        let result = runner.run("go", &[], Path::new("."), 1).await;
        assert!(matches!(result, Err(CommandError::Timeout { .. })));
    }
}
