//! Scenario world for the lifecycle behaviour suite.

use std::sync::Arc;
use std::time::{Duration, Instant};

use roster_config::Config;

use crate::lifecycle::{
    HeadlessFrontend, LaunchPlan, ProcessControl, RunningApp, ServiceDeps, launch,
};
use crate::milestones::RecordingReporter;
use crate::process::{LifecycleError, NoSignals, ShutdownReason};

use super::config::test_config;

pub type StepResult = Result<(), String>;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Holds one application run and the observations made about it.
pub struct LifecycleWorld {
    pub config: Config,
    pub reporter: Arc<RecordingReporter>,
    frontend: Arc<HeadlessFrontend>,
    app: Option<RunningApp>,
    pub port: Option<u16>,
    pub triggers: Option<(bool, bool)>,
    pub result: Option<Result<(), LifecycleError>>,
    pub shutdown_elapsed: Option<Duration>,
    pub second: Option<Result<RunningApp, LifecycleError>>,
}

impl Default for LifecycleWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleWorld {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            reporter: Arc::new(RecordingReporter::new()),
            frontend: Arc::new(HeadlessFrontend::new()),
            app: None,
            port: None,
            triggers: None,
            result: None,
            shutdown_elapsed: None,
            second: None,
        }
    }

    fn plan(&self, config: Config, reporter: Arc<RecordingReporter>) -> LaunchPlan {
        LaunchPlan {
            config,
            process: ProcessControl {
                signals: Arc::new(NoSignals),
            },
            services: ServiceDeps {
                reporter,
                frontend: Arc::clone(&self.frontend) as _,
            },
        }
    }

    pub fn launch(&mut self) -> StepResult {
        if self.app.is_some() {
            return Err("application already launched".to_owned());
        }
        let plan = self.plan(self.config.clone(), Arc::clone(&self.reporter));
        let app = launch(plan).map_err(|error| error.to_string())?;
        if !app.wait_ready(READY_TIMEOUT).is_completed() {
            return Err("startup did not complete".to_owned());
        }
        self.port = Some(app.lock_port());
        self.app = Some(app);
        Ok(())
    }

    pub fn launch_second(&mut self) -> StepResult {
        let port = self.port.ok_or("first instance not running")?;
        let config = Config {
            lock_port: port,
            ..self.config.clone()
        };
        let plan = self.plan(config, Arc::new(RecordingReporter::new()));
        self.second = Some(launch(plan));
        Ok(())
    }

    pub fn close_then_signal(&mut self) -> StepResult {
        let app = self.app.as_ref().ok_or("application not running")?;
        let trigger = app.shutdown_handle();
        let closed = self.frontend.close_window();
        let signalled = trigger.trigger(ShutdownReason::Signal(15));
        self.triggers = Some((closed, signalled));
        Ok(())
    }

    pub fn wait(&mut self) -> StepResult {
        let app = self.app.take().ok_or("application not running")?;
        let started = Instant::now();
        self.result = Some(app.wait());
        self.shutdown_elapsed = Some(started.elapsed());
        Ok(())
    }
}

impl Drop for LifecycleWorld {
    fn drop(&mut self) {
        if let Some(app) = self.app.take() {
            let _ = app.shutdown();
        }
        if let Some(Ok(second)) = self.second.take() {
            let _ = second.shutdown();
        }
    }
}
