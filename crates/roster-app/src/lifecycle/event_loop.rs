//! The single UI event thread.
//!
//! UI construction runs here, after the synchronous part of startup has
//! returned, the same way a desktop toolkit defers work onto its
//! application thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use super::LIFECYCLE_TARGET;
use crate::threads::{CancelToken, ManagedThread, ThreadError, WaitOutcome};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised by [`EventLoop`].
#[derive(Debug, Error)]
pub enum EventLoopError {
    /// The event thread could not be started.
    #[error("failed to start event loop: {source}")]
    Start {
        /// Underlying thread error.
        #[source]
        source: ThreadError,
    },
    /// The loop has stopped and accepts no more work.
    #[error("event loop is stopped")]
    Stopped,
}

/// Runs posted closures one at a time on a dedicated thread.
#[derive(Debug)]
pub struct EventLoop {
    sender: Mutex<Option<Sender<Task>>>,
    thread: Arc<ManagedThread>,
}

impl EventLoop {
    /// Starts the event thread.
    pub fn start(name: &str) -> Result<Self, EventLoopError> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let thread = ManagedThread::spawn(name, move |interrupt| run(&receiver, interrupt))
            .map_err(|source| EventLoopError::Start { source })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread,
        })
    }

    /// Queues `task` behind everything already posted.
    pub fn post<F>(&self, task: F) -> Result<(), EventLoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref().ok_or(EventLoopError::Stopped)?;
        sender
            .send(Box::new(task))
            .map_err(|_| EventLoopError::Stopped)
    }

    /// Returns `true` while the event thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.is_alive()
    }

    /// Stops intake and waits up to `timeout` for queued work to finish.
    ///
    /// On timeout the loop is interrupted so it skips whatever is still
    /// queued, and the thread is left to finish on its own.
    pub fn shutdown(&self, timeout: Duration) -> WaitOutcome {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let outcome = self.thread.join_timeout(timeout);
        if !outcome.is_completed() {
            self.thread.interrupt();
            warn!(
                target: LIFECYCLE_TARGET,
                thread = %self.thread.name(),
                timeout_ms = timeout.as_millis(),
                "event loop did not stop in time"
            );
        }
        outcome
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn run(receiver: &Receiver<Task>, interrupt: &CancelToken) {
    debug!(target: LIFECYCLE_TARGET, "event loop started");
    while let Ok(task) = receiver.recv() {
        if interrupt.is_cancelled() {
            continue;
        }
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(target: LIFECYCLE_TARGET, "event loop task panicked");
        }
    }
    debug!(target: LIFECYCLE_TARGET, "event loop stopped");
}
