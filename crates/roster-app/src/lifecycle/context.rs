//! State shared between the controller, the event thread and background
//! tasks for one application run.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use roster_config::Config;

use super::LIFECYCLE_TARGET;
use super::phase::{LifecyclePhase, PhaseTracker};
use crate::milestones::{LifecycleReporter, Milestone};
use crate::process::{LifecycleError, ShutdownReason, ShutdownTrigger};
use crate::threads::Latch;

/// Everything one lifecycle run shares across threads.
pub struct LifecycleContext {
    config: Config,
    reporter: Arc<dyn LifecycleReporter>,
    trigger: ShutdownTrigger,
    phase: PhaseTracker,
    ready: Latch,
    fatal: Mutex<Option<LifecycleError>>,
}

impl LifecycleContext {
    /// Creates a context in [`LifecyclePhase::Init`].
    pub fn new(config: Config, reporter: Arc<dyn LifecycleReporter>) -> Self {
        Self {
            config,
            reporter,
            trigger: ShutdownTrigger::new(),
            phase: PhaseTracker::new(),
            ready: Latch::new(),
            fatal: Mutex::new(None),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Milestone observer.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn LifecycleReporter> {
        &self.reporter
    }

    /// The run's shutdown trigger.
    #[must_use]
    pub const fn trigger(&self) -> &ShutdownTrigger {
        &self.trigger
    }

    /// Fires once startup finishes.
    #[must_use]
    pub const fn ready(&self) -> &Latch {
        &self.ready
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.phase.current()
    }

    pub(crate) fn milestone(&self, milestone: Milestone) {
        self.reporter.milestone(milestone);
    }

    /// Moves to `next`, logging rather than failing on an illegal transition.
    pub(crate) fn advance(&self, next: LifecyclePhase) -> bool {
        match self.phase.advance(next) {
            Ok(()) => true,
            Err(error) => {
                warn!(target: LIFECYCLE_TARGET, %error, "phase transition skipped");
                false
            }
        }
    }

    /// Records a fatal error and triggers shutdown with it.
    ///
    /// Only the first error is kept; later ones are logged and dropped.
    pub(crate) fn fail(&self, error: LifecycleError) {
        self.reporter.fatal(&error);
        let message = error.to_string();
        {
            let mut slot = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(error);
            }
        }
        self.trigger.trigger(ShutdownReason::Fatal(message));
    }

    pub(crate) fn take_fatal(&self) -> Option<LifecycleError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
