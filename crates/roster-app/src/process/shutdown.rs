//! Shutdown triggers and the OS termination hook.
//!
//! Every shutdown source converges on one [`ShutdownTrigger`]. The first
//! trigger wins; later ones are no-ops, which makes double close/signal
//! sequences harmless.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use crate::threads::{Latch, WaitOutcome};

/// Why shutdown was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The OS delivered a termination signal.
    Signal(i32),
    /// The user closed the main window.
    WindowClosed,
    /// Code asked for an orderly shutdown.
    Requested,
    /// A fatal error occurred after the synchronous startup prefix.
    Fatal(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(formatter, "signal {signal}"),
            Self::WindowClosed => formatter.write_str("window closed"),
            Self::Requested => formatter.write_str("requested"),
            Self::Fatal(message) => write!(formatter, "fatal error: {message}"),
        }
    }
}

#[derive(Debug, Default)]
struct TriggerState {
    reason: Mutex<Option<ShutdownReason>>,
    fired: Latch,
}

/// Idempotent shutdown trigger shared by every shutdown source.
#[derive(Debug, Clone, Default)]
pub struct ShutdownTrigger {
    inner: Arc<TriggerState>,
}

impl ShutdownTrigger {
    /// Creates an untriggered instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Returns `true` only for the first request.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            debug!(
                target: PROCESS_TARGET,
                %reason,
                %existing,
                "shutdown already requested; ignoring trigger"
            );
            return false;
        }
        info!(target: PROCESS_TARGET, %reason, "shutdown requested");
        *slot = Some(reason);
        drop(slot);
        self.inner.fired.complete();
        true
    }

    /// Returns `true` once any source has triggered shutdown.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.fired.is_complete()
    }

    /// Reason recorded by the first trigger.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Blocks until shutdown is triggered and returns the winning reason.
    pub fn wait(&self) -> ShutdownReason {
        loop {
            if self.inner.fired.wait().is_completed()
                && let Some(reason) = self.reason()
            {
                return reason;
            }
        }
    }

    /// Blocks for up to `timeout` waiting for a trigger.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ShutdownReason> {
        match self.inner.fired.wait_timeout(timeout) {
            WaitOutcome::Completed => self.reason(),
            WaitOutcome::TimedOut | WaitOutcome::Interrupted => None,
        }
    }
}

/// Errors reported while installing the termination hook.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener thread could not be started.
    #[error("failed to start signal listener thread: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Abstraction over the process termination hook.
pub trait SignalSource: Send + Sync {
    /// Registers the hook so it fires `trigger` at most once per signal.
    fn install(&self, trigger: ShutdownTrigger) -> Result<SignalGuard, ShutdownError>;
}

/// Keeps the termination hook alive; closing it unregisters the hook.
pub struct SignalGuard {
    closer: Option<Box<dyn FnOnce() + Send>>,
    listener: Option<thread::JoinHandle<()>>,
}

impl SignalGuard {
    /// Guard for sources that registered nothing.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            closer: None,
            listener: None,
        }
    }

    /// Unregisters the hook and joins its listener. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
        if let Some(listener) = self.listener.take()
            && listener.join().is_err()
        {
            warn!(target: PROCESS_TARGET, "signal listener thread panicked");
        }
    }
}

impl fmt::Debug for SignalGuard {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SignalGuard")
            .field("active", &self.closer.is_some())
            .finish()
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Termination hook backed by `signal-hook`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds the system signal source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SignalSource for SystemShutdownSignal {
    fn install(&self, trigger: ShutdownTrigger) -> Result<SignalGuard, ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let listener = thread::Builder::new()
            .name("signal-listener".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(
                        target: PROCESS_TARGET,
                        signal,
                        "termination signal received"
                    );
                    trigger.trigger(ShutdownReason::Signal(signal));
                }
            })
            .map_err(|source| ShutdownError::Spawn { source })?;
        Ok(SignalGuard {
            closer: Some(Box::new(move || handle.close())),
            listener: Some(listener),
        })
    }
}

/// Source that installs no hook; shutdown comes only from code or the UI.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignals;

impl SignalSource for NoSignals {
    fn install(&self, _trigger: ShutdownTrigger) -> Result<SignalGuard, ShutdownError> {
        Ok(SignalGuard::inert())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn first_trigger_wins() {
        let trigger = ShutdownTrigger::new();
        assert!(trigger.trigger(ShutdownReason::WindowClosed));
        assert!(!trigger.trigger(ShutdownReason::Signal(SIGTERM)));
        assert_eq!(trigger.reason(), Some(ShutdownReason::WindowClosed));
    }

    #[rstest]
    fn wait_returns_reason_from_other_thread() {
        let trigger = ShutdownTrigger::new();
        let remote = trigger.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.trigger(ShutdownReason::Requested);
        });
        assert_eq!(trigger.wait(), ShutdownReason::Requested);
        handle.join().expect("trigger thread should not panic");
    }

    #[rstest]
    fn wait_timeout_without_trigger_is_none() {
        let trigger = ShutdownTrigger::new();
        let started = Instant::now();
        assert_eq!(trigger.wait_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!trigger.is_triggered());
    }

    #[rstest]
    fn system_signal_guard_closes_cleanly() {
        let trigger = ShutdownTrigger::new();
        let mut guard = SystemShutdownSignal::new()
            .install(trigger.clone())
            .expect("signal hook should install");
        guard.close();
        guard.close();
        assert!(!trigger.is_triggered());
    }
}
