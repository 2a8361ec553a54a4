//! Lifecycle and concurrency coordinator for the engineer roster
//! application.
//!
//! The crate owns what happens around the UI: single-instance detection
//! through a bound loopback port, the worker pool and long-lived background
//! threads, the startup milestones and a shutdown procedure that runs exactly
//! once and always finishes in bounded time.
//!
//! Startup runs a synchronous prefix (lock, termination hook, logging,
//! resources) and then hands UI construction to a dedicated event thread. Any of
//! an OS signal, the window-close action or a programmatic request fires the
//! shared [`ShutdownTrigger`]; the first one wins and the rest are ignored.
//!
//! The binary also carries a self-test mode (`--test=<scenario>`) that drives
//! the real lifecycle headlessly and writes JSON reports.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

use roster_config::Config;

mod cli;
pub mod harness;
mod lifecycle;
mod milestones;
mod process;
mod telemetry;
mod threads;

pub use lifecycle::{
    CloseHandle, EventLoop, EventLoopError, Frontend, FrontendError, HeadlessFrontend,
    LaunchPlan, LifecycleContext, LifecyclePhase, PhaseError, PhaseTracker, ProcessControl,
    RunningApp, ServiceDeps, StartupStage, launch, run_application,
};
pub use milestones::{
    LifecycleEvent, LifecycleReporter, Milestone, RecordingReporter,
    StructuredLifecycleReporter, appear_in_order,
};
pub use process::{
    LifecycleError, LockError, LockHandle, NoSignals, ShutdownError, ShutdownReason,
    ShutdownTrigger, SignalGuard, SignalSource, SingletonLock, SystemShutdownSignal,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use threads::{
    BackgroundTask, CancelToken, DrainOutcome, DrainReport, DrainTimeouts, Latch, ManagedThread,
    PoolError, PoolTermination, ThreadError, ThreadRegistry, WaitOutcome, WorkerPool,
};

use cli::{Cli, split_arguments};

/// Runs the `roster` binary with the given arguments and output streams.
///
/// Exit status is `0` on success and `1` on a duplicate instance, a fatal
/// startup error or a failed self-test.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_arguments(&args);

    let cli = match Cli::try_parse_from(&split.cli) {
        Ok(cli) => cli,
        Err(error)
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            let _ = write!(stderr, "{error}");
            return ExitCode::FAILURE;
        }
    };
    let config = match Config::load_from_args(split.config) {
        Ok(config) => config,
        Err(error) => {
            let _ = writeln!(stderr, "roster: failed to load configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    match cli.test {
        Some(selection) => run_self_test(&cli, selection, &config, stdout, stderr),
        None => run_interactive(config, stderr),
    }
}

fn run_interactive<E: Write>(config: Config, stderr: &mut E) -> ExitCode {
    match run_application(LaunchPlan::production(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) if error.is_duplicate_instance() => {
            let _ = writeln!(stderr, "roster: already running: {error}");
            ExitCode::FAILURE
        }
        Err(error) => {
            let _ = writeln!(stderr, "roster: fatal error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run_self_test<W: Write, E: Write>(
    cli: &Cli,
    selection: cli::TestSelection,
    config: &Config,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode {
    if let Err(error) = telemetry::initialise(config) {
        let _ = writeln!(stderr, "roster: {error}");
        return ExitCode::FAILURE;
    }
    let summary = match harness::run_scenarios(selection.scenarios(), config, &cli.output) {
        Ok(summary) => summary,
        Err(error) => {
            let _ = writeln!(stderr, "roster: {error}");
            return ExitCode::FAILURE;
        }
    };
    for entry in &summary.scenarios {
        let verdict = if entry.passed { "PASS" } else { "FAIL" };
        let _ = writeln!(
            stdout,
            "{verdict} {} ({} ms) -> {}",
            entry.scenario, entry.duration_ms, entry.report
        );
    }
    if summary.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests;
