//! Deterministic comparison of two result snapshots.
//!
//! The comparison is baseline-anchored: it answers "did anything that used
//! to pass start failing", so packages and tests that first appear in the
//! experiment are not reported. Findings are emitted in
//! package-name-then-test-name order; both snapshots iterate sorted
//! (`BTreeMap`), so the report text and counts are reproducible no matter
//! how the snapshots were built.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{ResultSnapshot, TestStatus};

/// A classified difference between baseline and experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffFinding {
    /// Pass in baseline, fail in experiment.
    Regression { package: String, test: String },

    /// Fail in baseline, pass in experiment.
    Fix { package: String, test: String },

    /// Package present in baseline, absent from experiment.
    MissingPackage { package: String },

    /// Test present in the baseline package, absent from the experiment
    /// package.
    MissingTest { package: String, test: String },

    /// Ran (pass or fail) in baseline, skipped in experiment. Reported as a
    /// coverage signal; not counted as a regression.
    NewlySkipped {
        package: String,
        test: String,
        from: TestStatus,
    },

    /// Skipped in baseline, ran (pass or fail) in experiment. Reported as a
    /// coverage signal; not counted as a fix.
    Unskipped {
        package: String,
        test: String,
        to: TestStatus,
    },
}

impl fmt::Display for DiffFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffFinding::Regression { package, test } => {
                write!(f, "REGRESSION [{package}] {test}: Pass -> Fail")
            }
            DiffFinding::Fix { package, test } => {
                write!(f, "FIX [{package}] {test}: Fail -> Pass")
            }
            DiffFinding::MissingPackage { package } => {
                write!(f, "Missing Package in Experiment: {package}")
            }
            DiffFinding::MissingTest { package, test } => {
                write!(f, "[{package}] Test Missing in Experiment: {test}")
            }
            DiffFinding::NewlySkipped {
                package,
                test,
                from,
            } => {
                write!(f, "NEWLY SKIPPED [{package}] {test}: {from} -> Skip")
            }
            DiffFinding::Unskipped { package, test, to } => {
                write!(f, "UNSKIPPED [{package}] {test}: Skip -> {to}")
            }
        }
    }
}

/// Ordered findings plus aggregate counts for one baseline/experiment pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub findings: Vec<DiffFinding>,

    /// Count of [`DiffFinding::Regression`] entries.
    pub regressions: usize,

    /// Count of [`DiffFinding::Fix`] entries.
    pub fixes: usize,
}

impl DiffReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_regressions(&self) -> bool {
        self.regressions > 0
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{finding}")?;
        }
        write!(
            f,
            "Summary: {} Regressions, {} Fixes",
            self.regressions, self.fixes
        )
    }
}

/// Compare an experiment snapshot against its baseline.
pub fn compare_snapshots(baseline: &ResultSnapshot, experiment: &ResultSnapshot) -> DiffReport {
    let mut report = DiffReport::default();

    for (package, tests) in baseline.packages() {
        let exp_tests = match experiment.package(package) {
            Some(tests) => tests,
            None => {
                report.findings.push(DiffFinding::MissingPackage {
                    package: package.clone(),
                });
                continue;
            }
        };

        for (name, base) in tests {
            let exp = match exp_tests.get(name) {
                Some(exp) => exp,
                None => {
                    report.findings.push(DiffFinding::MissingTest {
                        package: package.clone(),
                        test: name.clone(),
                    });
                    continue;
                }
            };

            match (base.status, exp.status) {
                (TestStatus::Pass, TestStatus::Fail) => {
                    report.findings.push(DiffFinding::Regression {
                        package: package.clone(),
                        test: name.clone(),
                    });
                    report.regressions += 1;
                }
                (TestStatus::Fail, TestStatus::Pass) => {
                    report.findings.push(DiffFinding::Fix {
                        package: package.clone(),
                        test: name.clone(),
                    });
                    report.fixes += 1;
                }
                (from @ (TestStatus::Pass | TestStatus::Fail), TestStatus::Skip) => {
                    report.findings.push(DiffFinding::NewlySkipped {
                        package: package.clone(),
                        test: name.clone(),
                        from,
                    });
                }
                (TestStatus::Skip, to @ (TestStatus::Pass | TestStatus::Fail)) => {
                    report.findings.push(DiffFinding::Unskipped {
                        package: package.clone(),
                        test: name.clone(),
                        to,
                    });
                }
                _ => {}
            }
        }
    }

    report
}
