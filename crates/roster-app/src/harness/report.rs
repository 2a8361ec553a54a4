//! JSON reports written by test mode.

use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;

use super::Scenario;
use crate::milestones::Milestone;
use crate::process::files::write_atomically;

/// Errors raised while persisting reports.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A report could not be encoded.
    #[error("failed to encode report '{path}': {source}")]
    Encode {
        /// Destination of the report.
        path: Utf8PathBuf,
        /// Underlying encoder error.
        #[source]
        source: serde_json::Error,
    },
    /// A report could not be written.
    #[error("failed to write report '{path}': {source}")]
    Write {
        /// Destination of the report.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// One named assertion inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    /// What was asserted.
    pub name: String,
    /// Whether it held.
    pub passed: bool,
    /// Observed value when it helps diagnose a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of one scenario, written to `<output>/<scenario>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Scenario that ran.
    pub scenario: Scenario,
    /// `true` when every check passed.
    pub passed: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Milestones observed, in order.
    pub milestones: Vec<String>,
    /// Individual assertions.
    pub checks: Vec<Check>,
}

impl ScenarioReport {
    pub(crate) const fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            passed: true,
            duration_ms: 0,
            milestones: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub(crate) fn check(&mut self, name: impl Into<String>, passed: bool, detail: Option<String>) {
        self.passed &= passed;
        self.checks.push(Check {
            name: name.into(),
            passed,
            detail,
        });
    }

    pub(crate) fn finish(mut self, elapsed: Duration, milestones: &[Milestone]) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.milestones = milestones
            .iter()
            .map(|milestone| milestone.as_str().to_owned())
            .collect();
        self
    }

    /// Failed check names.
    #[must_use]
    pub fn failures(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| check.name.as_str())
            .collect()
    }
}

/// Per-scenario line in `summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    /// Scenario that ran.
    pub scenario: Scenario,
    /// Whether it passed.
    pub passed: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// File holding the full report.
    pub report: Utf8PathBuf,
}

/// Aggregate result written to `<output>/summary.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// `true` when every scenario passed.
    pub passed: bool,
    /// One entry per scenario, in run order.
    pub scenarios: Vec<SummaryEntry>,
}

pub(crate) fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), HarnessError> {
    let mut contents = serde_json::to_vec_pretty(value).map_err(|source| HarnessError::Encode {
        path: path.to_owned(),
        source,
    })?;
    contents.push(b'\n');
    write_atomically(path.as_std_path(), &contents).map_err(|source| HarnessError::Write {
        path: path.to_owned(),
        source,
    })
}
