//! Monotonic lifecycle state machine.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

use super::LIFECYCLE_TARGET;

/// Coarse application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Nothing has run yet.
    Init,
    /// The instance lock is held.
    LockAcquired,
    /// Another instance holds the lock. Terminal.
    LockDenied,
    /// Startup completed; the UI is live.
    Running,
    /// The shutdown procedure is in progress.
    ShuttingDown,
    /// Shutdown completed. Terminal.
    Terminated,
    /// A fatal error ended the lifecycle. Terminal.
    Failed,
}

impl LifecyclePhase {
    /// Returns `true` for phases with no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::LockDenied | Self::Terminated | Self::Failed)
    }

    /// Returns `true` when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn permits(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::LockAcquired | Self::LockDenied)
                | (
                    Self::LockAcquired,
                    Self::Running | Self::ShuttingDown | Self::Failed
                )
                | (Self::Running, Self::ShuttingDown | Self::Failed)
                | (Self::ShuttingDown, Self::Terminated)
        )
    }

    /// Stable lowercase label used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::LockAcquired => "lock_acquired",
            Self::LockDenied => "lock_denied",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Raised when a transition would move the lifecycle backwards or sideways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal lifecycle transition from {from} to {to}")]
pub struct PhaseError {
    /// Phase at the time of the attempt.
    pub from: LifecyclePhase,
    /// Rejected target phase.
    pub to: LifecyclePhase,
}

/// Shared holder of the current [`LifecyclePhase`].
#[derive(Debug)]
pub struct PhaseTracker {
    current: Mutex<LifecyclePhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    /// Starts in [`LifecyclePhase::Init`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(LifecyclePhase::Init),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn current(&self) -> LifecyclePhase {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next` if the transition is legal.
    pub fn advance(&self, next: LifecyclePhase) -> Result<(), PhaseError> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *current;
        if !from.permits(next) {
            return Err(PhaseError { from, to: next });
        }
        *current = next;
        drop(current);
        debug!(target: LIFECYCLE_TARGET, %from, to = %next, "lifecycle phase changed");
        Ok(())
    }
}
