//! Behavioural tests for the bounded thread drain.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::milestones::RecordingReporter;
use crate::threads::{
    DrainOutcome, DrainReport, DrainTimeouts, ManagedThread, ThreadRegistry, WorkerPool,
};

use super::support::StepResult;

const EPSILON: Duration = Duration::from_millis(500);
const LONG_RUNNER: &str = "long-runner";

struct DrainWorld {
    reporter: Arc<RecordingReporter>,
    registry: Option<ThreadRegistry>,
    timeouts: Option<DrainTimeouts>,
    threads: Vec<Arc<ManagedThread>>,
    report: Option<DrainReport>,
    elapsed: Option<Duration>,
}

impl DrainWorld {
    fn registry(&self) -> Result<&ThreadRegistry, String> {
        self.registry
            .as_ref()
            .ok_or_else(|| "registry not created".to_owned())
    }
}

impl Drop for DrainWorld {
    fn drop(&mut self) {
        for thread in &self.threads {
            thread.interrupt();
        }
    }
}

#[fixture]
fn world() -> RefCell<DrainWorld> {
    RefCell::new(DrainWorld {
        reporter: Arc::new(RecordingReporter::new()),
        registry: None,
        timeouts: None,
        threads: Vec::new(),
        report: None,
        elapsed: None,
    })
}

#[given("a registry with a two second pool bound and a one second thread bound")]
fn given_registry(world: &RefCell<DrainWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let pool = WorkerPool::new("drain-pool", 2).map_err(|error| error.to_string())?;
    let reporter = world.reporter.clone();
    world.registry = Some(ThreadRegistry::new(pool, reporter));
    world.timeouts = Some(DrainTimeouts {
        pool: Duration::from_secs(2),
        per_thread: Duration::from_secs(1),
    });
    Ok(())
}

#[given("two threads that finish quickly and one that runs until interrupted")]
fn given_threads(world: &RefCell<DrainWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let mut threads = Vec::new();
    for name in ["quick-1", "quick-2"] {
        let thread = ManagedThread::spawn(name, |_| thread::sleep(Duration::from_millis(50)))
            .map_err(|error| error.to_string())?;
        threads.push(thread);
    }
    let long = ManagedThread::spawn(LONG_RUNNER, |interrupt| {
        while !interrupt.sleep(Duration::from_millis(20)) {}
    })
    .map_err(|error| error.to_string())?;
    threads.push(long);

    let registry = world.registry()?.clone();
    for thread in &threads {
        if !registry.register(Arc::clone(thread)) {
            return Err(format!("registration of '{}' refused", thread.name()));
        }
    }
    world.threads = threads;
    thread::sleep(Duration::from_millis(200));
    Ok(())
}

#[when("the registry is drained")]
fn when_drained(world: &RefCell<DrainWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let timeouts = world.timeouts.ok_or("timeouts not configured")?;
    let registry = world.registry()?.clone();
    let started = Instant::now();
    let outcome = registry.drain(timeouts);
    world.elapsed = Some(started.elapsed());
    match outcome {
        DrainOutcome::Drained(report) => {
            world.report = Some(report);
            Ok(())
        }
        DrainOutcome::AlreadyDrained => Err("registry was already drained".to_owned()),
    }
}

#[then("the drain returns within its bound")]
fn then_within_bound(world: &RefCell<DrainWorld>) {
    let world = world.borrow();
    let elapsed = world.elapsed.expect("drain should be timed");
    let timeouts = world.timeouts.expect("timeouts configured");
    assert!(elapsed >= timeouts.per_thread, "returned early: {elapsed:?}");
    assert!(
        elapsed <= timeouts.budget(world.threads.len()) + EPSILON,
        "exceeded bound: {elapsed:?}"
    );
}

#[then("the long-running thread is reported as a straggler")]
fn then_straggler(world: &RefCell<DrainWorld>) {
    let world = world.borrow();
    let report = world.report.as_ref().expect("drain report");
    assert_eq!(report.stragglers, vec![LONG_RUNNER.to_owned()]);
    assert_eq!(world.reporter.stragglers(), vec![LONG_RUNNER.to_owned()]);
}

#[then("the registry is empty")]
fn then_empty(world: &RefCell<DrainWorld>) {
    let world = world.borrow();
    let registry = world.registry().expect("registry created");
    assert_eq!(registry.count(), 0);
}

#[scenario(path = "tests/features/thread_drain.feature")]
fn thread_drain(#[from(world)] _: RefCell<DrainWorld>) -> Result<(), String> {
    Ok(())
}
