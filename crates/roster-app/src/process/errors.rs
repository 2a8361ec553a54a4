//! Unified error surface for application startup and supervision.

use std::io;

use thiserror::Error;

use super::lock::LockError;
use super::shutdown::ShutdownError;
use crate::lifecycle::{EventLoopError, FrontendError, PhaseError, StartupStage};
use crate::telemetry::TelemetryError;
use crate::threads::{PoolError, ThreadError};

/// Errors that end the application lifecycle.
///
/// Everything except [`LifecycleError::DuplicateInstance`] is a fatal
/// startup failure; both map to exit status 1.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Another instance holds the lock port.
    #[error("another instance is already running (lock port {port})")]
    DuplicateInstance {
        /// Contended port.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },
    /// The lock port could not be bound for another reason.
    #[error("failed to bind instance lock port {port}: {source}")]
    LockBind {
        /// Requested port.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },
    /// Logging could not be configured.
    #[error("failed to initialise logging: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The worker pool could not be started or refused work.
    #[error("worker pool failure: {source}")]
    Pool {
        /// Underlying pool error.
        #[source]
        source: PoolError,
    },
    /// A managed thread could not be started.
    #[error("thread start failure: {source}")]
    Thread {
        /// Underlying thread error.
        #[source]
        source: ThreadError,
    },
    /// The event loop could not be started or accept work.
    #[error("event loop failure: {source}")]
    EventLoop {
        /// Underlying event loop error.
        #[source]
        source: EventLoopError,
    },
    /// The termination hook could not be installed.
    #[error("failed to install shutdown hook: {source}")]
    Signals {
        /// Underlying hook error.
        #[source]
        source: ShutdownError,
    },
    /// A UI construction step failed.
    #[error("{stage} failed: {source}")]
    FatalStartup {
        /// Step that failed.
        stage: StartupStage,
        /// Error reported by the UI layer.
        #[source]
        source: FrontendError,
    },
    /// The lifecycle state machine rejected a transition.
    #[error(transparent)]
    Phase(#[from] PhaseError),
    /// A fatal shutdown reason arrived without a structured error.
    #[error("fatal error: {message}")]
    Fatal {
        /// Reason carried by the shutdown trigger.
        message: String,
    },
}

impl LifecycleError {
    /// Returns `true` when the failure is the duplicate-instance case.
    #[must_use]
    pub const fn is_duplicate_instance(&self) -> bool {
        matches!(self, Self::DuplicateInstance { .. })
    }
}

impl From<LockError> for LifecycleError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::DuplicateInstance { port, source } => {
                Self::DuplicateInstance { port, source }
            }
            LockError::Bind { port, source } => Self::LockBind { port, source },
        }
    }
}

impl From<TelemetryError> for LifecycleError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<PoolError> for LifecycleError {
    fn from(source: PoolError) -> Self {
        Self::Pool { source }
    }
}

impl From<ThreadError> for LifecycleError {
    fn from(source: ThreadError) -> Self {
        Self::Thread { source }
    }
}

impl From<EventLoopError> for LifecycleError {
    fn from(source: EventLoopError) -> Self {
        Self::EventLoop { source }
    }
}

impl From<ShutdownError> for LifecycleError {
    fn from(source: ShutdownError) -> Self {
        Self::Signals { source }
    }
}
