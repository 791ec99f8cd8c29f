//! Normalized result model for one test execution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminal outcome of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    /// Capitalized label used in rendered report lines.
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Pass => "Pass",
            TestStatus::Fail => "Fail",
            TestStatus::Skip => "Skip",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Normalized terminal outcome for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name as reported by the runner.
    pub name: String,

    /// Final status (last terminal event wins).
    pub status: TestStatus,

    /// Elapsed seconds reported with the terminal event.
    pub elapsed_secs: f64,
}

/// Test name → result mapping for one package.
pub type PackageResults = BTreeMap<String, TestResult>;

/// Normalized package → test → outcome mapping for one run (baseline or
/// experiment).
///
/// Both levels are `BTreeMap`, so iteration is sorted by construction and
/// report ordering never depends on insertion order. Within a package each
/// test name maps to exactly one result; re-recording a name overwrites the
/// prior entry (reruns and subtests: the final status supersedes earlier
/// ones).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    packages: BTreeMap<String, PackageResults>,
}

impl ResultSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the package entry exists, even if no per-test result follows.
    /// Packages that only produced build diagnostics still participate in
    /// missing-package comparison.
    pub fn touch_package(&mut self, package: &str) {
        self.packages.entry(package.to_string()).or_default();
    }

    /// Upsert the terminal result for `(package, result.name)`.
    pub fn record(&mut self, package: &str, result: TestResult) {
        self.packages
            .entry(package.to_string())
            .or_default()
            .insert(result.name.clone(), result);
    }

    /// Iterate packages in sorted order.
    pub fn packages(&self) -> impl Iterator<Item = (&String, &PackageResults)> {
        self.packages.iter()
    }

    /// Look up one package's results.
    pub fn package(&self, name: &str) -> Option<&PackageResults> {
        self.packages.get(name)
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn test_count(&self) -> usize {
        self.packages.values().map(|tests| tests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
