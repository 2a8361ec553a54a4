//! Startup and shutdown sequencing.
//!
//! Startup runs a synchronous prefix on the calling thread (lock, termination
//! hook, logging, resources) and defers UI construction to the event
//! thread. Shutdown runs once, on the thread that called
//! [`RunningApp::wait`], no matter how many sources triggered it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use roster_config::Config;

use super::LIFECYCLE_TARGET;
use super::context::LifecycleContext;
use super::event_loop::EventLoop;
use super::frontend::{CloseHandle, Frontend, HeadlessFrontend, StartupStage};
use super::phase::LifecyclePhase;
use crate::milestones::{LifecycleReporter, Milestone, StructuredLifecycleReporter};
use crate::process::{
    LifecycleError, LockError, LockHandle, ShutdownReason, ShutdownTrigger, SignalGuard,
    SignalSource, SingletonLock, SystemShutdownSignal,
};
use crate::telemetry;
use crate::threads::{DrainOutcome, DrainTimeouts, ThreadRegistry, WaitOutcome, WorkerPool};

const POOL_NAME: &str = "roster-worker";
const EVENT_THREAD_NAME: &str = "roster-events";
const INITIAL_LOAD_THREAD_NAME: &str = "initial-load";

/// Process-level collaborators.
pub struct ProcessControl {
    /// Source of OS termination requests.
    pub signals: Arc<dyn SignalSource>,
}

/// Application-level collaborators.
pub struct ServiceDeps {
    /// Milestone observer.
    pub reporter: Arc<dyn LifecycleReporter>,
    /// UI layer.
    pub frontend: Arc<dyn Frontend>,
}

/// Everything [`launch`] needs.
pub struct LaunchPlan {
    /// Effective configuration.
    pub config: Config,
    /// Process-level collaborators.
    pub process: ProcessControl,
    /// Application-level collaborators.
    pub services: ServiceDeps,
}

impl LaunchPlan {
    /// Plan wired to OS signals, structured logging and the headless UI.
    #[must_use]
    pub fn production(config: Config) -> Self {
        Self {
            config,
            process: ProcessControl {
                signals: Arc::new(SystemShutdownSignal::new()),
            },
            services: ServiceDeps {
                reporter: Arc::new(StructuredLifecycleReporter::new()),
                frontend: Arc::new(HeadlessFrontend::new()),
            },
        }
    }
}

/// Runs the application until shutdown completes.
pub fn run_application(plan: LaunchPlan) -> Result<(), LifecycleError> {
    launch(plan)?.wait()
}

/// Runs the synchronous startup prefix and schedules the rest on the event
/// thread.
///
/// Returns as soon as UI construction is queued; use
/// [`RunningApp::wait_ready`] to wait for startup to finish.
pub fn launch(plan: LaunchPlan) -> Result<RunningApp, LifecycleError> {
    let LaunchPlan {
        config,
        process,
        services,
    } = plan;
    let ProcessControl { signals } = process;
    let ServiceDeps { reporter, frontend } = services;
    let context = Arc::new(LifecycleContext::new(config, reporter));

    let mut lock = match SingletonLock::acquire(context.config().lock_port()) {
        Ok(lock) => {
            context.advance(LifecyclePhase::LockAcquired);
            lock
        }
        Err(error) => return Err(lock_denied(&context, error)),
    };

    match start_services(&context, signals.as_ref(), frontend) {
        Ok(services) => Ok(RunningApp {
            context,
            lock,
            services,
        }),
        Err(error) => {
            context.reporter().fatal(&error);
            context.advance(LifecyclePhase::Failed);
            lock.release();
            Err(error)
        }
    }
}

// Any bind failure denies the lock; only a foreign owner is not fatal.
fn lock_denied(context: &LifecycleContext, error: LockError) -> LifecycleError {
    let error = LifecycleError::from(error);
    context.advance(LifecyclePhase::LockDenied);
    if !error.is_duplicate_instance() {
        context.reporter().fatal(&error);
    }
    error
}

struct Services {
    registry: ThreadRegistry,
    event_loop: EventLoop,
    signals: SignalGuard,
}

fn start_services(
    context: &Arc<LifecycleContext>,
    signals: &dyn SignalSource,
    frontend: Arc<dyn Frontend>,
) -> Result<Services, LifecycleError> {
    let signals = signals.install(context.trigger().clone())?;

    let config = context.config();
    telemetry::initialise(config)?;
    context.milestone(Milestone::LoggingInitialized);

    let pool = WorkerPool::new(POOL_NAME, config.pool_size())?;
    let registry = ThreadRegistry::new(pool, Arc::clone(context.reporter()));
    let event_loop = EventLoop::start(EVENT_THREAD_NAME)?;
    context.milestone(Milestone::ResourcesInitialized);

    let ui_context = Arc::clone(context);
    let ui_registry = registry.clone();
    event_loop.post(move || start_ui(&ui_context, &ui_registry, frontend))?;
    debug!(target: LIFECYCLE_TARGET, "UI construction scheduled");

    Ok(Services {
        registry,
        event_loop,
        signals,
    })
}

// Runs on the event thread.
fn start_ui(
    context: &Arc<LifecycleContext>,
    registry: &ThreadRegistry,
    frontend: Arc<dyn Frontend>,
) {
    if context.trigger().is_triggered() {
        return;
    }
    if let Err(source) = frontend.build_main_window() {
        context.fail(LifecycleError::FatalStartup {
            stage: StartupStage::MainWindow,
            source,
        });
        return;
    }
    context.milestone(Milestone::MainWindowInitialized);

    let close = CloseHandle::new(context.trigger().clone());
    if let Err(source) = frontend.wire_controller(close) {
        context.fail(LifecycleError::FatalStartup {
            stage: StartupStage::Controller,
            source,
        });
        return;
    }
    context.milestone(Milestone::ControllerInitialized);
    context.milestone(Milestone::ApplicationInitialized);

    let task_context = Arc::clone(context);
    let task_registry = registry.clone();
    let spawned = registry.spawn(INITIAL_LOAD_THREAD_NAME, move |_interrupt| {
        dispatch_initial_load(&task_context, &task_registry, frontend);
    });
    if let Err(error) = spawned
        && !context.trigger().is_triggered()
    {
        context.fail(error.into());
    }
}

// Runs on the initial-load background thread.
fn dispatch_initial_load(
    context: &Arc<LifecycleContext>,
    registry: &ThreadRegistry,
    frontend: Arc<dyn Frontend>,
) {
    context.milestone(Milestone::AsyncTaskStarted);
    let load_context = Arc::clone(context);
    let submitted = registry.submit(move |cancel| {
        if let Err(source) = frontend.load_initial_data(cancel)
            && !cancel.is_cancelled()
        {
            load_context.fail(LifecycleError::FatalStartup {
                stage: StartupStage::InitialLoad,
                source,
            });
        }
    });
    if let Err(error) = submitted {
        // Rejection after shutdown began is expected, not fatal.
        if !context.trigger().is_triggered() {
            context.fail(error.into());
        }
        return;
    }
    context.milestone(Milestone::DataLoadStarted);
    if context.advance(LifecyclePhase::Running) {
        context.ready().complete();
        info!(target: LIFECYCLE_TARGET, "application running");
    }
}

/// A started application. Dropping it releases the instance lock without
/// running the shutdown procedure.
pub struct RunningApp {
    context: Arc<LifecycleContext>,
    lock: LockHandle,
    services: Services,
}

impl RunningApp {
    /// Waits up to `timeout` for startup to finish.
    pub fn wait_ready(&self, timeout: Duration) -> WaitOutcome {
        self.context.ready().wait_timeout(timeout)
    }

    /// Returns `true` once startup has finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.context.ready().is_complete()
    }

    /// Trigger shared with the window-close path and OS signals.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownTrigger {
        self.context.trigger().clone()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.context.phase()
    }

    /// Port held by the instance lock.
    #[must_use]
    pub const fn lock_port(&self) -> u16 {
        self.lock.port()
    }

    /// Registry owning the worker pool and background threads.
    #[must_use]
    pub const fn registry(&self) -> &ThreadRegistry {
        &self.services.registry
    }

    /// Triggers an orderly shutdown and runs it.
    pub fn shutdown(self) -> Result<(), LifecycleError> {
        self.context.trigger().trigger(ShutdownReason::Requested);
        self.wait()
    }

    /// Blocks until shutdown is triggered, then runs the shutdown procedure.
    ///
    /// A fatal trigger skips the orderly procedure: only the lock is
    /// released and the recorded error is returned.
    pub fn wait(mut self) -> Result<(), LifecycleError> {
        let reason = self.context.trigger().wait();
        if let ShutdownReason::Fatal(message) = reason {
            self.context.advance(LifecyclePhase::Failed);
            self.services.signals.close();
            self.lock.release();
            return Err(self
                .context
                .take_fatal()
                .unwrap_or(LifecycleError::Fatal { message }));
        }
        self.shut_down(&reason);
        Ok(())
    }

    fn shut_down(&mut self, reason: &ShutdownReason) {
        let context = Arc::clone(&self.context);
        let config = context.config();
        context.advance(LifecyclePhase::ShuttingDown);
        context.milestone(Milestone::ShutdownStarted);
        info!(target: LIFECYCLE_TARGET, %reason, "shutting down");

        self.services.signals.close();
        if !self
            .services
            .event_loop
            .shutdown(config.event_loop_timeout())
            .is_completed()
        {
            warn!(target: LIFECYCLE_TARGET, "continuing shutdown with event loop still busy");
        }

        let timeouts = DrainTimeouts {
            pool: config.pool_timeout(),
            per_thread: config.thread_timeout(),
        };
        if let DrainOutcome::Drained(report) = self.services.registry.drain(timeouts) {
            debug!(
                target: LIFECYCLE_TARGET,
                joined = report.joined,
                stragglers = report.stragglers.len(),
                elapsed_ms = report.elapsed.as_millis(),
                "threads drained"
            );
        }

        self.lock.release();
        context.advance(LifecyclePhase::Terminated);
        context.milestone(Milestone::ShutdownComplete);
    }
}

impl fmt::Debug for RunningApp {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RunningApp")
            .field("phase", &self.phase())
            .field("lock", &self.lock)
            .field("registry", &self.services.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;
    use crate::milestones::{LifecycleEvent, RecordingReporter};

    fn lock_error(duplicate: bool) -> LockError {
        if duplicate {
            LockError::DuplicateInstance {
                port: 7,
                source: io::ErrorKind::AddrInUse.into(),
            }
        } else {
            LockError::Bind {
                port: 7,
                source: io::Error::other("no loopback interface"),
            }
        }
    }

    #[rstest]
    #[case::duplicate(true)]
    #[case::bind(false)]
    fn any_lock_failure_denies_the_lock(#[case] duplicate: bool) {
        let reporter = Arc::new(RecordingReporter::new());
        let context = LifecycleContext::new(Config::default(), reporter.clone());

        let error = lock_denied(&context, lock_error(duplicate));

        assert_eq!(context.phase(), LifecyclePhase::LockDenied);
        assert_eq!(error.is_duplicate_instance(), duplicate);
        let reported = reporter
            .events()
            .iter()
            .any(|event| matches!(event, LifecycleEvent::Fatal(_)));
        assert_eq!(reported, !duplicate);
    }
}
