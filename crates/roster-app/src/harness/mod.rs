//! Self-test scenarios run by `roster --test=<scenario>`.
//!
//! Each scenario launches the real lifecycle with a headless frontend, an
//! ephemeral lock port and no OS signal hook, then records named checks.

use std::fmt;
use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use roster_config::Config;

mod report;
mod scenarios;

pub use report::{Check, HarnessError, ScenarioReport, Summary, SummaryEntry};

const HARNESS_TARGET: &str = "roster_app::harness";

/// Scenarios available in test mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Startup milestones and duplicate-instance rejection.
    Startup,
    /// Shutdown triggered twice; drain bounds and lock release.
    Shutdown,
    /// CSV export and import through the worker pool.
    Csv,
}

impl Scenario {
    /// Report file stem and CLI name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Csv => "csv",
        }
    }

    fn run(self, config: &Config, output: &Utf8Path) -> ScenarioReport {
        match self {
            Self::Startup => scenarios::startup(config),
            Self::Shutdown => scenarios::shutdown(config),
            Self::Csv => scenarios::csv(config, output),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Runs `selected` in order and writes one report per scenario plus
/// `summary.json` into `output`.
pub fn run_scenarios(
    selected: &[Scenario],
    config: &Config,
    output: &Utf8Path,
) -> Result<Summary, HarnessError> {
    let mut summary = Summary {
        passed: true,
        scenarios: Vec::with_capacity(selected.len()),
    };
    for scenario in selected {
        let started = Instant::now();
        info!(target: HARNESS_TARGET, %scenario, "running scenario");
        let report = scenario.run(config, output);
        let path = output.join(format!("{scenario}.json"));
        report::write_json(&path, &report)?;
        info!(
            target: HARNESS_TARGET,
            %scenario,
            passed = report.passed,
            elapsed_ms = started.elapsed().as_millis(),
            "scenario finished"
        );
        summary.passed &= report.passed;
        summary.scenarios.push(SummaryEntry {
            scenario: *scenario,
            passed: report.passed,
            duration_ms: report.duration_ms,
            report: path,
        });
    }
    report::write_json(&output.join("summary.json"), &summary)?;
    Ok(summary)
}
