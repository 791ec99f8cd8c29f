//! Consumer workspace lifecycle: acquire, reset, inject, run tests.
//!
//! One workspace per consumer repository, cached under the work root and
//! keyed by a digest of the normalized repository URL so distinct
//! repositories that share a basename never alias.
//!
//! The lifecycle `Absent → Acquired → BaselineRan → Reset → Injected →
//! ExperimentRan` is enforced in the type system: [`WorkspaceManager::acquire`]
//! yields a [`Workspace`], [`Workspace::reset`] yields a [`CleanWorkspace`]
//! token, and only that token can [`CleanWorkspace::inject`] the candidate,
//! which yields a [`CandidateWorkspace`] for the experiment run. Skipping the
//! reset between the baseline run and the injection does not compile.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ImpactError, Result};
use crate::exec::{CommandOutput, CommandRunner};

/// Bounded retry for repository cloning.
///
/// Injectable so tests run with zero delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2_000,
        }
    }
}

/// Wall-clock bounds for the external tools, in seconds. `0` disables the
/// bound for that tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTimeouts {
    /// `git clone`.
    pub clone_secs: u64,
    /// `git checkout` / `git clean` during reset.
    pub reset_secs: u64,
    /// Dependency override and graph resolution.
    pub resolve_secs: u64,
    /// Test runner execution.
    pub test_secs: u64,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            clone_secs: 300,
            reset_secs: 60,
            resolve_secs: 300,
            test_secs: 1200,
        }
    }
}

/// Owns the work root and hands out per-consumer workspaces.
pub struct WorkspaceManager {
    runner: Arc<dyn CommandRunner>,
    work_root: PathBuf,
    retry: RetryPolicy,
    timeouts: CommandTimeouts,
}

impl WorkspaceManager {
    pub fn new(runner: Arc<dyn CommandRunner>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            work_root: work_root.into(),
            retry: RetryPolicy::default(),
            timeouts: CommandTimeouts::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Directory a repository's workspace lives in, whether or not it has
    /// been acquired yet.
    pub fn workspace_dir(&self, url: &str) -> PathBuf {
        self.work_root.join(workspace_dir_name(url))
    }

    /// Clone the repository, or reuse an existing cached checkout after
    /// restoring it to a clean tracked state. The cache restore is a
    /// correctness requirement, not a speed optimization: a dirty cached
    /// workspace must never leak prior edits into a new run.
    pub async fn acquire(&self, url: &str, branch: &str) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.work_root)
            .await
            .map_err(|e| ImpactError::Acquire {
                url: url.to_string(),
                message: format!("create work root {}: {e}", self.work_root.display()),
            })?;

        let repo_dir = self.workspace_dir(url);
        let workspace = Workspace::new(
            Arc::clone(&self.runner),
            repo_dir.clone(),
            self.timeouts.clone(),
        );

        if repo_dir.join(".git").is_dir() {
            debug!(url, dir = %repo_dir.display(), "reusing cached workspace");
            workspace
                .reset_tree()
                .await
                .map_err(|e| ImpactError::Acquire {
                    url: url.to_string(),
                    message: format!("cached workspace could not be cleaned: {e}"),
                })?;
            return Ok(workspace);
        }

        let args = argv(&[
            "clone",
            "--depth",
            "1",
            "--branch",
            branch,
            url,
            &repo_dir.display().to_string(),
        ]);

        let mut last_failure = String::new();
        for attempt in 1..=self.retry.max_attempts.max(1) {
            match self
                .runner
                .run("git", &args, &self.work_root, self.timeouts.clone_secs)
                .await
            {
                Ok(output) if output.success => {
                    info!(url, branch, attempt, "cloned consumer repository");
                    return Ok(workspace);
                }
                Ok(output) => {
                    last_failure = format!(
                        "git clone exited with {}: {}",
                        output.exit_code,
                        output.stderr.trim()
                    );
                }
                Err(error) => last_failure = error.to_string(),
            }

            warn!(
                url,
                attempt,
                max_attempts = self.retry.max_attempts,
                failure = %last_failure,
                "clone attempt failed, clearing partial checkout"
            );
            let _ = tokio::fs::remove_dir_all(&repo_dir).await;

            if attempt < self.retry.max_attempts && self.retry.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.retry.delay_ms)).await;
            }
        }

        Err(ImpactError::Acquire {
            url: url.to_string(),
            message: last_failure,
        })
    }
}

/// An acquired consumer checkout in its published-dependency state.
pub struct Workspace {
    runner: Arc<dyn CommandRunner>,
    repo_dir: PathBuf,
    module_dir: PathBuf,
    timeouts: CommandTimeouts,
}

impl Workspace {
    fn new(runner: Arc<dyn CommandRunner>, repo_dir: PathBuf, timeouts: CommandTimeouts) -> Self {
        let module_dir = repo_dir.clone();
        Self {
            runner,
            repo_dir,
            module_dir,
            timeouts,
        }
    }

    /// Point the workspace at the subdirectory containing the consumer
    /// module, when it does not live at the repository root.
    pub fn with_module_dir(mut self, subdir: Option<&str>) -> Self {
        self.module_dir = match subdir {
            Some(subdir) if !subdir.is_empty() => self.repo_dir.join(subdir),
            _ => self.repo_dir.clone(),
        };
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Execute the test runner in structured-output mode against the
    /// published dependency (baseline). Non-zero exit is an analyzed
    /// outcome, not an error.
    pub async fn run_tests(&self, packages: &[String]) -> Result<Vec<u8>> {
        run_test_command(
            self.runner.as_ref(),
            &self.module_dir,
            packages,
            self.timeouts.test_secs,
        )
        .await
    }

    /// Discard all local modifications and untracked files, returning the
    /// checkout to its post-acquisition state. Idempotent: a second reset in
    /// a row is a no-op.
    pub async fn reset(&self) -> Result<CleanWorkspace<'_>> {
        self.reset_tree().await?;
        Ok(CleanWorkspace { workspace: self })
    }

    async fn reset_tree(&self) -> Result<()> {
        self.git_reset_step(&["checkout", "--", "."]).await?;
        self.git_reset_step(&["clean", "-fd"]).await?;
        debug!(dir = %self.repo_dir.display(), "workspace reset to clean tracked state");
        Ok(())
    }

    async fn git_reset_step(&self, parts: &[&str]) -> Result<()> {
        let args = argv(parts);
        let output = self
            .runner
            .run("git", &args, &self.repo_dir, self.timeouts.reset_secs)
            .await
            .map_err(|e| ImpactError::Reset(e.to_string()))?;
        if !output.success {
            return Err(ImpactError::Reset(describe_failure("git", &args, &output)));
        }
        Ok(())
    }
}

/// Proof that the tree was reset after the baseline run. Possessing this
/// token is the only way to inject the candidate module.
pub struct CleanWorkspace<'a> {
    workspace: &'a Workspace,
}

impl<'a> CleanWorkspace<'a> {
    /// Record a dependency override pointing `target_module` at the local
    /// candidate checkout, then re-resolve the dependency graph so the
    /// override takes effect. Consumes the clean-state token.
    pub async fn inject(
        self,
        target_module: &str,
        candidate_path: &Path,
    ) -> Result<CandidateWorkspace<'a>> {
        let candidate = std::fs::canonicalize(candidate_path).map_err(|e| {
            ImpactError::Inject(format!(
                "candidate module path {}: {e}",
                candidate_path.display()
            ))
        })?;

        let workspace = self.workspace;
        let replace = format!("{target_module}={}", candidate.display());
        workspace
            .run_resolve_step(&["mod", "edit", "-replace", &replace])
            .await?;
        workspace.run_resolve_step(&["mod", "tidy"]).await?;

        info!(
            target_module,
            candidate = %candidate.display(),
            dir = %workspace.module_dir.display(),
            "candidate module injected"
        );
        Ok(CandidateWorkspace { workspace })
    }
}

impl Workspace {
    async fn run_resolve_step(&self, parts: &[&str]) -> Result<()> {
        let args = argv(parts);
        let output = self
            .runner
            .run("go", &args, &self.module_dir, self.timeouts.resolve_secs)
            .await
            .map_err(|e| ImpactError::Inject(e.to_string()))?;
        if !output.success {
            return Err(ImpactError::Inject(describe_failure("go", &args, &output)));
        }
        Ok(())
    }
}

/// Workspace with the candidate module wired in; runs the experiment.
pub struct CandidateWorkspace<'a> {
    workspace: &'a Workspace,
}

impl CandidateWorkspace<'_> {
    /// Execute the test runner against the injected candidate (experiment).
    pub async fn run_tests(&self, packages: &[String]) -> Result<Vec<u8>> {
        let workspace = self.workspace;
        run_test_command(
            workspace.runner.as_ref(),
            &workspace.module_dir,
            packages,
            workspace.timeouts.test_secs,
        )
        .await
    }
}

async fn run_test_command(
    runner: &dyn CommandRunner,
    dir: &Path,
    packages: &[String],
    timeout_secs: u64,
) -> Result<Vec<u8>> {
    let mut args = argv(&["test", "-json"]);
    args.extend(packages.iter().cloned());

    match runner.run("go", &args, dir, timeout_secs).await {
        Ok(output) => {
            if !output.success {
                debug!(
                    exit_code = output.exit_code,
                    "test runner exited non-zero (analyzed, not fatal)"
                );
            }
            Ok(output.stdout)
        }
        Err(error) => Err(ImpactError::Launch(error.to_string())),
    }
}

fn describe_failure(program: &str, args: &[String], output: &CommandOutput) -> String {
    format!(
        "{program} {} exited with {}: {}",
        args.join(" "),
        output.exit_code,
        output.stderr.trim()
    )
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

/// Collision-resistant directory name for a repository: readable basename
/// plus a short digest of the full normalized URL. Two repositories sharing
/// a basename on different hosts or owners get distinct workspaces.
fn workspace_dir_name(url: &str) -> String {
    let normalized = normalize_repo_url(url);
    let digest = hex::encode(Sha256::digest(normalized.as_bytes()));
    let basename = normalized
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("repo");
    format!("{basename}-{}", &digest[..12])
}

/// Normalize a repository URL for identity: trim whitespace and trailing
/// slashes, drop a `.git` suffix, lowercase the scheme and host (paths stay
/// case-sensitive).
fn normalize_repo_url(url: &str) -> String {
    let mut url = url.trim().trim_end_matches('/').to_string();
    if let Some(stripped) = url.strip_suffix(".git") {
        url = stripped.to_string();
    }
    let path_start = url
        .find("://")
        .map(|i| i + 3)
        .and_then(|host_start| url[host_start..].find('/').map(|j| host_start + j));
    match path_start {
        Some(path_start) => {
            format!("{}{}", url[..path_start].to_lowercase(), &url[path_start..])
        }
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandError;
    use crate::fakes::ScriptedRunner;

    fn manager(runner: Arc<ScriptedRunner>, root: &Path) -> WorkspaceManager {
        WorkspaceManager::new(runner, root).with_retry(RetryPolicy {
            max_attempts: 3,
            delay_ms: 0,
        })
    }

    #[test]
    fn test_workspace_dir_name_distinguishes_hosts() {
        let a = workspace_dir_name("https://github.com/org-a/utils");
        let b = workspace_dir_name("https://gitlab.example.com/org-b/utils");
        assert_ne!(a, b);
        assert!(a.starts_with("utils-"));
        assert!(b.starts_with("utils-"));
    }

    #[test]
    fn test_workspace_dir_name_stable_across_url_spellings() {
        let plain = workspace_dir_name("https://github.com/org/repo");
        assert_eq!(plain, workspace_dir_name("https://github.com/org/repo.git"));
        assert_eq!(plain, workspace_dir_name("https://GitHub.COM/org/repo/"));
    }

    #[test]
    fn test_normalize_keeps_path_case() {
        let normalized = normalize_repo_url("HTTPS://GitHub.com/Org/Repo");
        assert_eq!(normalized, "https://github.com/Org/Repo");
    }

    #[tokio::test]
    async fn test_acquire_clones_fresh() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_success(b"");
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0]
            .line()
            .starts_with("git clone --depth 1 --branch main https://example.com/org/app"));
        assert_eq!(workspace.repo_dir(), manager.workspace_dir("https://example.com/org/app"));
    }

    #[tokio::test]
    async fn test_acquire_reuses_cached_checkout() {
        let runner = Arc::new(ScriptedRunner::new());
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let repo_dir = manager.workspace_dir("https://example.com/org/app");
        std::fs::create_dir_all(repo_dir.join(".git")).unwrap();

        manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");

        let lines: Vec<String> = runner.calls().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["git checkout -- .", "git clean -fd"]);
    }

    #[tokio::test]
    async fn test_acquire_retries_then_succeeds() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_exit(128, b"");
        runner.push_error(CommandError::Timeout {
            program: "git".to_string(),
            timeout_secs: 300,
        });
        runner.push_success(b"");
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire should succeed on the third attempt");
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_acquire_surfaces_last_failure_after_retries() {
        let runner = Arc::new(ScriptedRunner::new());
        for _ in 0..3 {
            runner.push_exit(128, b"");
        }
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let result = manager.acquire("https://example.com/org/app", "main").await;
        match result {
            Err(ImpactError::Acquire { url, message }) => {
                assert_eq!(url, "https://example.com/org/app");
                assert!(message.contains("exited with 128"));
            }
            Err(other) => panic!("expected acquire error, got {other}"),
            Ok(_) => panic!("expected acquire error, got a workspace"),
        }
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_success(b"");
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");

        workspace.reset().await.expect("first reset failed");
        workspace.reset().await.expect("second reset failed");

        let checkout_count = runner
            .calls()
            .iter()
            .filter(|c| c.line() == "git checkout -- .")
            .count();
        assert_eq!(checkout_count, 2);
    }

    #[tokio::test]
    async fn test_reset_failure_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_success(b""); // clone
        runner.push_exit(1, b""); // checkout
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");
        let result = workspace.reset().await;
        assert!(matches!(result, Err(ImpactError::Reset(_))));
    }

    #[tokio::test]
    async fn test_inject_issues_override_then_resolve() {
        let runner = Arc::new(ScriptedRunner::new());
        let root = tempfile::tempdir().unwrap();
        let candidate = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed")
            .with_module_dir(Some("services/api"));

        let clean = workspace.reset().await.expect("reset failed");
        clean
            .inject("example.com/lib/shared", candidate.path())
            .await
            .expect("inject failed");

        let calls = runner.calls();
        let canonical = std::fs::canonicalize(candidate.path()).unwrap();
        let edit = &calls[calls.len() - 2];
        assert_eq!(
            edit.line(),
            format!(
                "go mod edit -replace example.com/lib/shared={}",
                canonical.display()
            )
        );
        assert_eq!(edit.cwd, workspace.module_dir());
        assert_eq!(calls[calls.len() - 1].line(), "go mod tidy");
    }

    #[tokio::test]
    async fn test_inject_rejects_missing_candidate_path() {
        let runner = Arc::new(ScriptedRunner::new());
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");
        let clean = workspace.reset().await.expect("reset failed");
        let result = clean
            .inject(
                "example.com/lib/shared",
                Path::new("/definitely/not/a/real/path"),
            )
            .await;
        assert!(matches!(result, Err(ImpactError::Inject(_))));
    }

    #[tokio::test]
    async fn test_inject_resolve_failure_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        let root = tempfile::tempdir().unwrap();
        let candidate = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");
        let clean = workspace.reset().await.expect("reset failed");

        // acquire consumed the default-success clone; script the inject steps
        runner.push_success(b""); // mod edit
        runner.push_exit(1, b""); // mod tidy
        let result = clean.inject("example.com/lib/shared", candidate.path()).await;
        match result {
            Err(ImpactError::Inject(message)) => assert!(message.contains("go mod tidy")),
            Err(other) => panic!("expected inject error, got {other}"),
            Ok(_) => panic!("expected inject error, got an injected workspace"),
        }
    }

    #[tokio::test]
    async fn test_run_tests_returns_output_despite_failures() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_success(b""); // clone
        runner.push_exit(1, b"{\"Action\":\"fail\"}\n");
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");
        let raw = workspace
            .run_tests(&["./...".to_string()])
            .await
            .expect("non-zero exit must not be an error");
        assert_eq!(raw, b"{\"Action\":\"fail\"}\n");

        let test_call = &runner.calls()[1];
        assert_eq!(test_call.line(), "go test -json ./...");
    }

    #[tokio::test]
    async fn test_run_tests_launch_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_success(b""); // clone
        runner.push_error(CommandError::Spawn {
            program: "go".to_string(),
            message: "not found".to_string(),
        });
        let root = tempfile::tempdir().unwrap();
        let manager = manager(Arc::clone(&runner), root.path());

        let workspace = manager
            .acquire("https://example.com/org/app", "main")
            .await
            .expect("acquire failed");
        let result = workspace.run_tests(&[]).await;
        assert!(matches!(result, Err(ImpactError::Launch(_))));
    }
}
