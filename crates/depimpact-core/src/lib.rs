//! depimpact core - differential dependency-impact analysis.
//!
//! Determines whether a candidate version of a shared module breaks any
//! downstream consumer's test suite: each consumer's suite runs once against
//! the published module version (baseline) and once against the candidate
//! (experiment), and per-test outcomes are diffed into a deterministic
//! report of regressions and fixes.

pub mod config;
pub mod diff;
pub mod error;
pub mod exec;
pub mod fakes;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod telemetry;
pub mod workspace;

pub use config::{Consumer, ImpactConfig};
pub use diff::{compare_snapshots, DiffFinding, DiffReport};
pub use error::{ImpactError, Result};
pub use exec::{CommandError, CommandOutput, CommandRunner, ProcessRunner};
pub use model::{PackageResults, ResultSnapshot, TestResult, TestStatus};
pub use parser::{parse_test_stream, EventAction, RawEvent};
pub use pipeline::{BatchReport, ConsumerOutcome, ConsumerStatus, ImpactPipeline};
pub use telemetry::init_tracing;
pub use workspace::{
    CandidateWorkspace, CleanWorkspace, CommandTimeouts, RetryPolicy, Workspace, WorkspaceManager,
};
