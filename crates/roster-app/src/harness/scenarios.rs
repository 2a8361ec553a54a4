use std::fmt::Write as _;
use std::fs;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use signal_hook::consts::signal::SIGTERM;
use tracing::warn;

use roster_config::Config;

use super::{HARNESS_TARGET, Scenario, ScenarioReport};
use crate::lifecycle::{
    HeadlessFrontend, LaunchPlan, LifecyclePhase, ProcessControl, RunningApp, ServiceDeps, launch,
};
use crate::milestones::{
    LifecycleReporter, Milestone, RecordingReporter, StructuredLifecycleReporter, appear_in_order,
};
use crate::process::files::write_atomically;
use crate::process::{NoSignals, ShutdownReason, SingletonLock};
use crate::threads::{CancelToken, ThreadRegistry};

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const JOB_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

const CSV_HEADER: &str = "id,name,discipline";
const SAMPLE_ENGINEERS: &[(u32, &str, &str)] = &[
    (1, "Ada Lovelace", "Software"),
    (2, "Isambard Brunel", "Civil"),
    (3, "Hedy Lamarr", "Radio"),
    (4, "Grace Hopper", "Compilers"),
    (5, "Nikola Tesla", "Electrical"),
];

struct Harnessed {
    app: RunningApp,
    reporter: Arc<RecordingReporter>,
    frontend: Arc<HeadlessFrontend>,
}

fn recording_reporter() -> Arc<RecordingReporter> {
    let structured: Arc<dyn LifecycleReporter> = Arc::new(StructuredLifecycleReporter::new());
    Arc::new(RecordingReporter::forwarding(structured))
}

fn plan(
    config: Config,
    reporter: Arc<RecordingReporter>,
    frontend: Arc<HeadlessFrontend>,
) -> LaunchPlan {
    LaunchPlan {
        config,
        process: ProcessControl {
            signals: Arc::new(NoSignals),
        },
        services: ServiceDeps { reporter, frontend },
    }
}

// Launches on an ephemeral port and waits for startup to finish.
fn start(config: &Config, report: &mut ScenarioReport) -> Option<Harnessed> {
    let config = Config {
        lock_port: 0,
        ..config.clone()
    };
    let reporter = recording_reporter();
    let frontend = Arc::new(HeadlessFrontend::new());
    let launched = launch(plan(config, Arc::clone(&reporter), Arc::clone(&frontend)));
    let app = match launched {
        Ok(app) => app,
        Err(error) => {
            report.check("application launches", false, Some(error.to_string()));
            return None;
        }
    };
    let ready = app.wait_ready(READY_TIMEOUT);
    report.check(
        "startup completes",
        ready.is_completed(),
        Some(format!("{ready:?}")),
    );
    Some(Harnessed {
        app,
        reporter,
        frontend,
    })
}

pub(super) fn startup(config: &Config) -> ScenarioReport {
    let started = Instant::now();
    let mut report = ScenarioReport::new(Scenario::Startup);
    let Some(Harnessed { app, reporter, .. }) = start(config, &mut report) else {
        return report.finish(started.elapsed(), &[]);
    };

    let phase = app.phase();
    report.check(
        "phase is running",
        phase == LifecyclePhase::Running,
        Some(phase.to_string()),
    );
    let milestones = reporter.milestones();
    report.check(
        "startup milestones in order",
        appear_in_order(&milestones, &Milestone::STARTUP),
        None,
    );

    let duplicate = Config {
        lock_port: app.lock_port(),
        ..config.clone()
    };
    let rejected = match launch(plan(
        duplicate,
        Arc::new(RecordingReporter::new()),
        Arc::new(HeadlessFrontend::new()),
    )) {
        Ok(second) => {
            if let Err(error) = second.shutdown() {
                warn!(target: HARNESS_TARGET, %error, "second instance failed to stop");
            }
            Err("second instance started".to_owned())
        }
        Err(error) if error.is_duplicate_instance() => Ok(()),
        Err(error) => Err(error.to_string()),
    };
    report.check(
        "second instance is rejected",
        rejected.is_ok(),
        rejected.err(),
    );

    let stopped = app.shutdown();
    report.check(
        "shutdown succeeds",
        stopped.is_ok(),
        stopped.err().map(|error| error.to_string()),
    );
    report.finish(started.elapsed(), &reporter.milestones())
}

pub(super) fn shutdown(config: &Config) -> ScenarioReport {
    let started = Instant::now();
    let mut report = ScenarioReport::new(Scenario::Shutdown);
    let Some(Harnessed {
        app,
        reporter,
        frontend,
    }) = start(config, &mut report)
    else {
        return report.finish(started.elapsed(), &[]);
    };

    let trigger = app.shutdown_handle();
    let port = app.lock_port();
    let threads = app.registry().count();
    let first = frontend.close_window();
    let second = trigger.trigger(ShutdownReason::Signal(SIGTERM));
    report.check(
        "only the first trigger takes effect",
        first && !second,
        Some(format!("close={first} signal={second}")),
    );

    let shutdown_started = Instant::now();
    let result = app.wait();
    let elapsed = shutdown_started.elapsed();
    report.check(
        "shutdown succeeds",
        result.is_ok(),
        result.err().map(|error| error.to_string()),
    );

    for milestone in Milestone::SHUTDOWN {
        let count = reporter.count(milestone);
        report.check(
            format!("'{milestone}' logged once"),
            count == 1,
            Some(format!("count={count}")),
        );
    }
    report.check(
        "shutdown milestones in order",
        appear_in_order(&reporter.milestones(), &Milestone::SHUTDOWN),
        None,
    );
    report.check("pool drains without forcing", !reporter.pool_was_forced(), None);

    let threads = u32::try_from(threads).unwrap_or(u32::MAX);
    let bound = config.event_loop_timeout()
        + config.pool_timeout()
        + config.thread_timeout().saturating_mul(threads)
        + SHUTDOWN_SLACK;
    report.check(
        "shutdown finishes within bound",
        elapsed <= bound,
        Some(format!("elapsed={elapsed:?} bound={bound:?}")),
    );

    let reacquired = SingletonLock::acquire(port);
    report.check(
        "lock port is released",
        reacquired.is_ok(),
        reacquired.err().map(|error| error.to_string()),
    );
    report.finish(started.elapsed(), &reporter.milestones())
}

pub(super) fn csv(config: &Config, output: &Utf8Path) -> ScenarioReport {
    let started = Instant::now();
    let mut report = ScenarioReport::new(Scenario::Csv);
    let Some(Harnessed { app, reporter, .. }) = start(config, &mut report) else {
        return report.finish(started.elapsed(), &[]);
    };

    let path = output.join("engineers.csv");
    let export_path = path.clone();
    let exported = run_on_pool(app.registry(), move |_| export_records(&export_path));
    report.check(
        "records exported on the worker pool",
        exported.is_ok(),
        exported.err(),
    );

    let import_path = path.clone();
    let imported = run_on_pool(app.registry(), move |_| import_records(&import_path));
    match imported {
        Ok(count) => report.check(
            "imported record count matches export",
            count == SAMPLE_ENGINEERS.len(),
            Some(format!("imported={count} expected={}", SAMPLE_ENGINEERS.len())),
        ),
        Err(error) => report.check("records imported on the worker pool", false, Some(error)),
    }

    let stopped = app.shutdown();
    report.check(
        "shutdown succeeds",
        stopped.is_ok(),
        stopped.err().map(|error| error.to_string()),
    );
    report.finish(started.elapsed(), &reporter.milestones())
}

// Runs `job` on the registry's pool and waits for its result.
fn run_on_pool<T, F>(registry: &ThreadRegistry, job: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> Result<T, String> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    registry
        .submit(move |cancel| {
            let _ = sender.send(job(cancel));
        })
        .map_err(|error| error.to_string())?;
    receiver
        .recv_timeout(JOB_TIMEOUT)
        .map_err(|error| format!("pool job did not report back: {error}"))?
}

fn export_records(path: &Utf8Path) -> Result<(), String> {
    let mut contents = String::from(CSV_HEADER);
    contents.push('\n');
    for (id, name, discipline) in SAMPLE_ENGINEERS {
        let _ = writeln!(contents, "{id},{name},{discipline}");
    }
    write_atomically(path.as_std_path(), contents.as_bytes())
        .map_err(|error| format!("cannot write '{path}': {error}"))
}

fn import_records(path: &Utf8Path) -> Result<usize, String> {
    let contents =
        fs::read_to_string(path).map_err(|error| format!("cannot read '{path}': {error}"))?;
    let mut lines = contents.lines();
    if lines.next() != Some(CSV_HEADER) {
        return Err(format!("'{path}' has an unexpected header"));
    }
    Ok(lines.filter(|line| !line.trim().is_empty()).count())
}
