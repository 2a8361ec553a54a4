//! Lifecycle milestones and the observers that publish them.
//!
//! The milestone messages are a stable log contract: monitoring scripts and
//! the built-in test harness match on the exact strings returned by
//! [`Milestone::as_str`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::process::LifecycleError;

use crate::lifecycle::LIFECYCLE_TARGET as MILESTONE_TARGET;

/// Observable lifecycle milestones, in the order they are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    /// The tracing subscriber is installed.
    LoggingInitialized,
    /// Worker pool, thread registry and event loop exist.
    ResourcesInitialized,
    /// The frontend built its main window.
    MainWindowInitialized,
    /// The record controller is wired to the window.
    ControllerInitialized,
    /// The asynchronous startup suffix finished wiring the UI.
    ApplicationInitialized,
    /// The initial-load background task began running.
    AsyncTaskStarted,
    /// The initial record load was handed to the worker pool.
    DataLoadStarted,
    /// The shutdown procedure began.
    ShutdownStarted,
    /// The worker pool stopped, possibly after forced cancellation.
    ExecutorTerminated,
    /// Every registered thread was joined or reported as a straggler.
    ThreadsTerminated,
    /// The lock was released and the procedure finished.
    ShutdownComplete,
}

impl Milestone {
    /// Startup milestones in emission order.
    pub const STARTUP: [Self; 7] = [
        Self::LoggingInitialized,
        Self::ResourcesInitialized,
        Self::MainWindowInitialized,
        Self::ControllerInitialized,
        Self::ApplicationInitialized,
        Self::AsyncTaskStarted,
        Self::DataLoadStarted,
    ];

    /// Shutdown milestones in emission order.
    pub const SHUTDOWN: [Self; 4] = [
        Self::ShutdownStarted,
        Self::ExecutorTerminated,
        Self::ThreadsTerminated,
        Self::ShutdownComplete,
    ];

    /// Log message for the milestone.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoggingInitialized => "logging initialized",
            Self::ResourcesInitialized => "resources initialized",
            Self::MainWindowInitialized => "main window initialized",
            Self::ControllerInitialized => "controller initialized",
            Self::ApplicationInitialized => "application initialized",
            Self::AsyncTaskStarted => "async task started",
            Self::DataLoadStarted => "data load started",
            Self::ShutdownStarted => "shutdown started",
            Self::ExecutorTerminated => "executor terminated",
            Self::ThreadsTerminated => "threads terminated",
            Self::ShutdownComplete => "shutdown complete",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Observer surfacing lifecycle events to log sinks and test harnesses.
pub trait LifecycleReporter: Send + Sync {
    /// A milestone was reached.
    fn milestone(&self, milestone: Milestone);

    /// The worker pool missed its shutdown bound and was cancelled.
    fn pool_forced(&self, timeout: Duration, abandoned: usize);

    /// A registered thread outlived its join bound.
    fn straggler(&self, name: &str, timeout: Duration);

    /// A fatal error is ending the process.
    fn fatal(&self, error: &LifecycleError);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn milestone(&self, milestone: Milestone) {
        (**self).milestone(milestone);
    }

    fn pool_forced(&self, timeout: Duration, abandoned: usize) {
        (**self).pool_forced(timeout, abandoned);
    }

    fn straggler(&self, name: &str, timeout: Duration) {
        (**self).straggler(name, timeout);
    }

    fn fatal(&self, error: &LifecycleError) {
        (**self).fatal(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn milestone(&self, milestone: Milestone) {
        tracing::info!(
            target: MILESTONE_TARGET,
            event = "milestone",
            "{milestone}"
        );
    }

    fn pool_forced(&self, timeout: Duration, abandoned: usize) {
        tracing::warn!(
            target: MILESTONE_TARGET,
            event = "pool_forced",
            timeout_ms = timeout.as_millis(),
            abandoned,
            "executor did not terminate in time; remaining tasks cancelled"
        );
    }

    fn straggler(&self, name: &str, timeout: Duration) {
        tracing::warn!(
            target: MILESTONE_TARGET,
            event = "straggler",
            thread = name,
            timeout_ms = timeout.as_millis(),
            "thread still alive after join bound; interrupt sent"
        );
    }

    fn fatal(&self, error: &LifecycleError) {
        tracing::error!(
            target: MILESTONE_TARGET,
            event = "fatal",
            error = %error,
            "fatal lifecycle error"
        );
    }
}

/// Event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A milestone was reached.
    Milestone(Milestone),
    /// The pool was cancelled with the given number of abandoned tasks.
    PoolForced {
        /// Queued tasks dropped without running.
        abandoned: usize,
    },
    /// A thread outlived its join bound.
    Straggler {
        /// Name of the thread.
        name: String,
    },
    /// A fatal error with its rendered message.
    Fatal(String),
}

/// Reporter that keeps every event in memory, optionally forwarding to
/// another reporter so the events are logged as well.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<LifecycleEvent>>,
    forward: Option<Arc<dyn LifecycleReporter>>,
}

impl RecordingReporter {
    /// Records without forwarding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and forwards every event to `inner`.
    #[must_use]
    pub fn forwarding(inner: Arc<dyn LifecycleReporter>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            forward: Some(inner),
        }
    }

    /// Copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded milestones in emission order.
    #[must_use]
    pub fn milestones(&self) -> Vec<Milestone> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LifecycleEvent::Milestone(milestone) => Some(milestone),
                _ => None,
            })
            .collect()
    }

    /// Number of times `milestone` was recorded.
    #[must_use]
    pub fn count(&self, milestone: Milestone) -> usize {
        self.milestones()
            .into_iter()
            .filter(|recorded| *recorded == milestone)
            .count()
    }

    /// Names of threads reported as stragglers.
    #[must_use]
    pub fn stragglers(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LifecycleEvent::Straggler { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Returns `true` when the pool had to be cancelled.
    #[must_use]
    pub fn pool_was_forced(&self) -> bool {
        self.events()
            .iter()
            .any(|event| matches!(event, LifecycleEvent::PoolForced { .. }))
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl fmt::Debug for RecordingReporter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RecordingReporter")
            .field("events", &self.events())
            .field("forwarding", &self.forward.is_some())
            .finish()
    }
}

impl LifecycleReporter for RecordingReporter {
    fn milestone(&self, milestone: Milestone) {
        self.record(LifecycleEvent::Milestone(milestone));
        if let Some(inner) = &self.forward {
            inner.milestone(milestone);
        }
    }

    fn pool_forced(&self, timeout: Duration, abandoned: usize) {
        self.record(LifecycleEvent::PoolForced { abandoned });
        if let Some(inner) = &self.forward {
            inner.pool_forced(timeout, abandoned);
        }
    }

    fn straggler(&self, name: &str, timeout: Duration) {
        self.record(LifecycleEvent::Straggler {
            name: name.to_owned(),
        });
        if let Some(inner) = &self.forward {
            inner.straggler(name, timeout);
        }
    }

    fn fatal(&self, error: &LifecycleError) {
        self.record(LifecycleEvent::Fatal(error.to_string()));
        if let Some(inner) = &self.forward {
            inner.fatal(error);
        }
    }
}

/// Returns `true` when `expected` appears in `recorded` in the same relative
/// order, ignoring interleaved milestones.
#[must_use]
pub fn appear_in_order(recorded: &[Milestone], expected: &[Milestone]) -> bool {
    let mut remaining = expected.iter().peekable();
    for milestone in recorded {
        if remaining.peek() == Some(&milestone) {
            remaining.next();
        }
    }
    remaining.peek().is_none()
}
