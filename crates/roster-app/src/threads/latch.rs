//! One-shot completion and cancellation primitives.
//!
//! [`Latch`] is the single-fire signal used for thread liveness, startup
//! readiness and shutdown requests. [`CancelToken`] layers advisory
//! cancellation on top of it so workloads can either poll or block on it.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited condition was reached.
    Completed,
    /// The bound elapsed first.
    TimedOut,
    /// The wait was interrupted because a holder of the latch panicked.
    ///
    /// Callers treat this like a timeout and carry on.
    Interrupted,
}

impl WaitOutcome {
    /// Returns `true` when the condition was reached.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Default)]
struct LatchState {
    done: Mutex<bool>,
    cvar: Condvar,
}

impl LatchState {
    fn lock_recovering(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-fire completion signal; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    inner: Arc<LatchState>,
}

impl Latch {
    /// Creates an open latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the latch. Returns `true` only for the call that fired it.
    pub fn complete(&self) -> bool {
        let mut done = self.inner.lock_recovering();
        if *done {
            return false;
        }
        *done = true;
        self.inner.cvar.notify_all();
        true
    }

    /// Returns `true` once the latch has fired.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.inner.lock_recovering()
    }

    /// Blocks until the latch fires or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut done = match self.inner.done.lock() {
            Ok(guard) => guard,
            Err(_) => return self.interrupted(),
        };
        while !*done {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitOutcome::TimedOut;
            }
            done = match self.inner.cvar.wait_timeout(done, remaining) {
                Ok((guard, _)) => guard,
                Err(_) => return self.interrupted(),
            };
        }
        WaitOutcome::Completed
    }

    /// Blocks until the latch fires.
    ///
    /// Returns [`WaitOutcome::Interrupted`] if the latch was poisoned while
    /// waiting.
    pub fn wait(&self) -> WaitOutcome {
        let mut done = match self.inner.done.lock() {
            Ok(guard) => guard,
            Err(_) => return self.interrupted(),
        };
        while !*done {
            done = match self.inner.cvar.wait(done) {
                Ok(guard) => guard,
                Err(_) => return self.interrupted(),
            };
        }
        WaitOutcome::Completed
    }

    // Clears the poison so later waiters see the latch's real state again.
    fn interrupted(&self) -> WaitOutcome {
        self.inner.done.clear_poison();
        WaitOutcome::Interrupted
    }
}

/// Advisory cancellation flag handed to pool jobs and managed threads.
///
/// Cancelling never stops a thread; the workload is expected to observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    latch: Latch,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns `true` for the first request.
    pub fn cancel(&self) -> bool {
        self.latch.complete()
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.latch.is_complete()
    }

    /// Sleeps for up to `timeout`, waking early on cancellation.
    ///
    /// Returns `true` when cancellation was requested.
    pub fn sleep(&self, timeout: Duration) -> bool {
        !matches!(self.latch.wait_timeout(timeout), WaitOutcome::TimedOut)
    }
}
