//! Handles for background work started through the registry.

use std::sync::Arc;
use std::time::Duration;

use super::latch::WaitOutcome;
use super::registry::ManagedThread;

/// Long-lived background work tracked by a [`super::ThreadRegistry`].
///
/// The thread was registered before it started and unregisters itself when
/// its body returns, so call sites never pair register/unregister by hand.
#[derive(Debug, Clone)]
pub struct BackgroundTask {
    thread: Arc<ManagedThread>,
}

impl BackgroundTask {
    pub(super) fn new(thread: Arc<ManagedThread>) -> Self {
        Self { thread }
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.thread.name()
    }

    /// Returns `true` once the body returned or unwound.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.thread.is_alive()
    }

    /// Sends the advisory interrupt observed through the body's token.
    pub fn interrupt(&self) {
        self.thread.interrupt();
    }

    /// Waits up to `timeout` for the task to finish.
    pub fn join(&self, timeout: Duration) -> WaitOutcome {
        self.thread.join_timeout(timeout)
    }

    /// Underlying managed thread.
    #[must_use]
    pub fn thread(&self) -> &Arc<ManagedThread> {
        &self.thread
    }
}
