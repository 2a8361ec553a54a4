//! Unit tests for startup and shutdown sequencing.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};

use roster_config::Config;

use crate::lifecycle::{
    Frontend, FrontendError, HeadlessFrontend, LaunchPlan, LifecyclePhase, MockFrontend,
    ProcessControl, RunningApp, ServiceDeps, StartupStage, launch,
};
use crate::milestones::{LifecycleEvent, Milestone, RecordingReporter, appear_in_order};
use crate::process::{LifecycleError, NoSignals, ShutdownReason, SingletonLock};
use crate::threads::WaitOutcome;

use super::support::{recording_reporter, test_config};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[fixture]
fn config() -> Config {
    test_config()
}

fn plan(
    config: Config,
    reporter: &Arc<RecordingReporter>,
    frontend: Arc<dyn Frontend>,
) -> LaunchPlan {
    LaunchPlan {
        config,
        process: ProcessControl {
            signals: Arc::new(NoSignals),
        },
        services: ServiceDeps {
            reporter: reporter.clone(),
            frontend,
        },
    }
}

fn launch_ready(config: Config, reporter: &Arc<RecordingReporter>) -> RunningApp {
    let app = launch(plan(config, reporter, Arc::new(HeadlessFrontend::new())))
        .expect("launch should succeed");
    assert_eq!(app.wait_ready(READY_TIMEOUT), WaitOutcome::Completed);
    app
}

fn failing_at(stage: StartupStage) -> MockFrontend {
    let mut frontend = MockFrontend::new();
    let failure = move || -> Result<(), FrontendError> {
        Err(FrontendError::new(format!("{stage} broke")))
    };
    match stage {
        StartupStage::MainWindow => {
            frontend.expect_build_main_window().returning(failure);
            frontend.expect_wire_controller().never();
            frontend.expect_load_initial_data().never();
        }
        StartupStage::Controller => {
            frontend.expect_build_main_window().returning(|| Ok(()));
            frontend.expect_wire_controller().returning(move |_| failure());
            frontend.expect_load_initial_data().never();
        }
        StartupStage::InitialLoad => {
            frontend.expect_build_main_window().returning(|| Ok(()));
            frontend.expect_wire_controller().returning(|_| Ok(()));
            frontend
                .expect_load_initial_data()
                .returning(move |_| failure().map(|()| 0));
        }
    }
    frontend
}

#[rstest]
fn startup_reports_milestones_in_order(config: Config) {
    let reporter = recording_reporter();
    let app = launch_ready(config, &reporter);

    assert_eq!(app.phase(), LifecyclePhase::Running);
    assert!(app.is_ready());
    assert!(app.lock_port() > 0);
    assert!(appear_in_order(&reporter.milestones(), &Milestone::STARTUP));
    for milestone in Milestone::STARTUP {
        assert_eq!(reporter.count(milestone), 1, "{milestone} repeated");
    }

    app.shutdown().expect("shutdown should succeed");
}

#[rstest]
fn double_trigger_runs_shutdown_once(config: Config) {
    let reporter = recording_reporter();
    let app = launch_ready(config, &reporter);
    let port = app.lock_port();
    let trigger = app.shutdown_handle();

    assert!(trigger.trigger(ShutdownReason::WindowClosed));
    assert!(!trigger.trigger(ShutdownReason::Signal(15)));
    app.wait().expect("shutdown should succeed");

    for milestone in Milestone::SHUTDOWN {
        assert_eq!(reporter.count(milestone), 1, "{milestone} not logged once");
    }
    assert!(appear_in_order(&reporter.milestones(), &Milestone::SHUTDOWN));
    assert_eq!(trigger.reason(), Some(ShutdownReason::WindowClosed));
    SingletonLock::acquire(port).expect("lock port should be free after shutdown");
}

#[rstest]
fn second_instance_is_rejected(config: Config) {
    let held = SingletonLock::acquire(0).expect("lock should bind");
    let reporter = recording_reporter();
    let duplicate = Config {
        lock_port: held.port(),
        ..config
    };

    let error = launch(plan(duplicate, &reporter, Arc::new(HeadlessFrontend::new())))
        .expect_err("second instance should be refused");

    assert!(error.is_duplicate_instance(), "unexpected error: {error}");
    assert!(reporter.milestones().is_empty());
    assert!(held.is_bound());
}

#[rstest]
#[case(StartupStage::MainWindow)]
#[case(StartupStage::Controller)]
#[case(StartupStage::InitialLoad)]
fn frontend_failure_is_fatal(config: Config, #[case] stage: StartupStage) {
    let reporter = recording_reporter();
    let app = launch(plan(config, &reporter, Arc::new(failing_at(stage))))
        .expect("synchronous startup should succeed");
    let port = app.lock_port();

    let error = app.wait().expect_err("frontend failure should be fatal");

    match error {
        LifecycleError::FatalStartup { stage: failed, .. } => assert_eq!(failed, stage),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(reporter.count(Milestone::ShutdownStarted), 0);
    assert!(
        reporter
            .events()
            .iter()
            .any(|event| matches!(event, LifecycleEvent::Fatal(_)))
    );
    SingletonLock::acquire(port).expect("lock port should be released after a fatal error");
}

#[rstest]
fn shutdown_before_startup_finishes_still_completes(config: Config) {
    let reporter = recording_reporter();
    let frontend = HeadlessFrontend::new().with_load_delay(Duration::from_secs(30));
    let app = launch(plan(config, &reporter, Arc::new(frontend))).expect("launch should succeed");

    app.shutdown().expect("shutdown should succeed");

    assert_eq!(reporter.count(Milestone::ShutdownComplete), 1);
}
