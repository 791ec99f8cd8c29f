//! Tolerant parser for the structured test-runner event stream.
//!
//! The input is the newline-delimited JSON emitted by `go test -json`. The
//! toolchain interleaves non-structured build diagnostics with event records,
//! so the stream is treated as untrusted: a line that does not decode is
//! dropped, never an error. Only a failure to read the underlying stream
//! itself is surfaced.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::BufRead;

use crate::error::{ImpactError, Result};
use crate::model::{ResultSnapshot, TestResult, TestStatus};

/// Action field of a raw test event.
///
/// Unknown actions (the toolchain grows new ones) decode to `Other` instead
/// of failing the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Run,
    Pass,
    Fail,
    Skip,
    Output,
    Pause,
    Cont,
    #[serde(other)]
    Other,
}

impl EventAction {
    /// Terminal actions decide a test's final status; everything else is
    /// progress noise.
    pub fn terminal_status(self) -> Option<TestStatus> {
        match self {
            EventAction::Pass => Some(TestStatus::Pass),
            EventAction::Fail => Some(TestStatus::Fail),
            EventAction::Skip => Some(TestStatus::Skip),
            _ => None,
        }
    }
}

/// One decoded record of the test runner's progress stream.
///
/// Field names follow the upstream wire format. `test` is empty for
/// package-level events.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "Time", default)]
    pub time: Option<DateTime<Utc>>,

    #[serde(rename = "Action")]
    pub action: EventAction,

    #[serde(rename = "Package", default)]
    pub package: String,

    #[serde(rename = "Test", default)]
    pub test: String,

    #[serde(rename = "Output", default)]
    pub output: String,

    #[serde(rename = "Elapsed", default)]
    pub elapsed: f64,
}

/// Parse a raw test-runner stream into a [`ResultSnapshot`].
///
/// Per line:
/// - undecodable (build noise, invalid UTF-8, truncated JSON) → skipped
/// - no package identifier → skipped
/// - package identifier present → package entry materialized
/// - non-empty test name with terminal action → upsert, last terminal wins
/// - empty test name (package-level summary) → not aggregated
///
/// Fails only with [`ImpactError::StreamRead`] when the stream cannot be
/// read to completion.
pub fn parse_test_stream<R: BufRead>(mut reader: R) -> Result<ResultSnapshot> {
    let mut snapshot = ResultSnapshot::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(ImpactError::StreamRead)?;
        if read == 0 {
            break;
        }

        let event: RawEvent = match serde_json::from_slice(&line) {
            Ok(event) => event,
            Err(_) => continue,
        };

        if event.package.is_empty() {
            continue;
        }
        snapshot.touch_package(&event.package);

        if event.test.is_empty() {
            continue;
        }
        if let Some(status) = event.action.terminal_status() {
            snapshot.record(
                &event.package,
                TestResult {
                    name: event.test.clone(),
                    status,
                    elapsed_secs: event.elapsed,
                },
            );
        }
    }

    Ok(snapshot)
}
