//! Per-consumer impact pipeline and batch driver.
//!
//! For each consumer: acquire workspace → run baseline tests → parse → reset
//! → inject candidate → run experiment tests → parse → diff. A consumer that
//! cannot complete is reported skipped with the error that stopped it; the
//! batch always moves on to the next consumer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Consumer;
use crate::diff::{compare_snapshots, DiffReport};
use crate::error::{ImpactError, Result};
use crate::exec::CommandRunner;
use crate::parser::parse_test_stream;
use crate::workspace::{CommandTimeouts, RetryPolicy, WorkspaceManager};

/// Outcome for one consumer.
#[derive(Debug)]
pub enum ConsumerStatus {
    /// Full differential analysis completed.
    Analyzed(DiffReport),

    /// A fatal-per-consumer error stopped the analysis.
    Skipped(ImpactError),
}

/// One consumer's result within a batch.
#[derive(Debug)]
pub struct ConsumerOutcome {
    pub consumer: String,
    pub status: ConsumerStatus,
}

/// Aggregate view over one batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ConsumerOutcome>,
}

impl BatchReport {
    pub fn analyzed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ConsumerStatus::Analyzed(_)))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.analyzed_count()
    }

    pub fn total_regressions(&self) -> usize {
        self.reports().map(|r| r.regressions).sum()
    }

    pub fn total_fixes(&self) -> usize {
        self.reports().map(|r| r.fixes).sum()
    }

    /// A clean batch has no regressions and no skipped consumers.
    pub fn is_clean(&self) -> bool {
        self.skipped_count() == 0 && self.total_regressions() == 0
    }

    fn reports(&self) -> impl Iterator<Item = &DiffReport> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            ConsumerStatus::Analyzed(report) => Some(report),
            ConsumerStatus::Skipped(_) => None,
        })
    }
}

/// Drives consumers through the differential execution-and-comparison
/// sequence.
pub struct ImpactPipeline {
    manager: WorkspaceManager,
    target_module: String,
    candidate_path: PathBuf,
}

impl ImpactPipeline {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        work_root: impl Into<PathBuf>,
        target_module: impl Into<String>,
        candidate_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manager: WorkspaceManager::new(runner, work_root),
            target_module: target_module.into(),
            candidate_path: candidate_path.into(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.manager = self.manager.with_retry(retry);
        self
    }

    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.manager = self.manager.with_timeouts(timeouts);
        self
    }

    /// Analyze every consumer in order, isolating failures per consumer.
    pub async fn run(&self, consumers: &[Consumer]) -> BatchReport {
        let mut outcomes = Vec::with_capacity(consumers.len());

        for consumer in consumers {
            info!(consumer = %consumer.name, repo = %consumer.repo_url, "analyzing consumer");
            let status = match self.analyze_consumer(consumer).await {
                Ok(report) => {
                    info!(
                        consumer = %consumer.name,
                        regressions = report.regressions,
                        fixes = report.fixes,
                        findings = report.findings.len(),
                        "analysis complete"
                    );
                    ConsumerStatus::Analyzed(report)
                }
                Err(error) => {
                    warn!(consumer = %consumer.name, error = %error, "skipping consumer");
                    ConsumerStatus::Skipped(error)
                }
            };
            outcomes.push(ConsumerOutcome {
                consumer: consumer.name.clone(),
                status,
            });
        }

        BatchReport { outcomes }
    }

    /// Full differential sequence for one consumer. Errors here are fatal
    /// for this consumer only.
    pub async fn analyze_consumer(&self, consumer: &Consumer) -> Result<DiffReport> {
        let workspace = self
            .manager
            .acquire(&consumer.repo_url, &consumer.branch)
            .await?
            .with_module_dir(consumer.module_dir.as_deref());

        let raw = workspace.run_tests(&consumer.packages).await?;
        let baseline = parse_test_stream(raw.as_slice())?;
        info!(
            consumer = %consumer.name,
            packages = baseline.package_count(),
            tests = baseline.test_count(),
            "baseline parsed"
        );

        let clean = workspace.reset().await?;
        let injected = clean
            .inject(&self.target_module, &self.candidate_path)
            .await?;

        let raw = injected.run_tests(&consumer.packages).await?;
        let experiment = parse_test_stream(raw.as_slice())?;
        info!(
            consumer = %consumer.name,
            packages = experiment.package_count(),
            tests = experiment.test_count(),
            "experiment parsed"
        );

        Ok(compare_snapshots(&baseline, &experiment))
    }

    pub fn candidate_path(&self) -> &Path {
        &self.candidate_path
    }

    pub fn target_module(&self) -> &str {
        &self.target_module
    }
}
