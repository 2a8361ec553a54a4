//! Registry of long-lived threads and the bounded drain procedure.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::THREADS_TARGET;
use super::latch::{CancelToken, Latch, WaitOutcome};
use super::pool::{PoolError, PoolTermination, WorkerPool};
use super::task::BackgroundTask;
use crate::milestones::{LifecycleReporter, Milestone};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Errors raised while starting managed threads.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// The registry is draining and accepts no new threads.
    #[error("cannot start thread '{name}': shutdown in progress")]
    ShuttingDown {
        /// Requested thread name.
        name: String,
    },
    /// The OS refused to start the thread.
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Requested thread name.
        name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Handle to a long-lived background thread outside the worker pool.
///
/// The thread is observed, not owned: it can be joined with a bound and
/// asked to stop through its interrupt token, nothing more.
pub struct ManagedThread {
    id: u64,
    name: String,
    finished: Latch,
    interrupt: CancelToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ManagedThread {
    /// Starts `body` on a new named thread without registering it.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Arc<Self>, ThreadError>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let thread = Self::prepare(name.into());
        thread.start(body, || {})?;
        Ok(thread)
    }

    pub(super) fn prepare(name: String) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            name,
            finished: Latch::new(),
            interrupt: CancelToken::new(),
            handle: Mutex::new(None),
        })
    }

    pub(super) fn start<F, E>(&self, body: F, on_exit: E) -> Result<(), ThreadError>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let exit = ExitSignal {
            on_exit: Some(Box::new(on_exit)),
            finished: self.finished.clone(),
        };
        let interrupt = self.interrupt.clone();
        // Held across the spawn so `reap` never runs before the handle is stored.
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _exit = exit;
                body(&interrupt);
            })
            .map_err(|source| ThreadError::Spawn {
                name: self.name.clone(),
                source,
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// Process-unique identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` until the thread body has returned or unwound.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.finished.is_complete()
    }

    /// Sends the advisory interrupt.
    pub fn interrupt(&self) {
        if self.interrupt.cancel() {
            debug!(target: THREADS_TARGET, thread = %self.name, "interrupt sent");
        }
    }

    /// Returns `true` once an interrupt was sent.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Waits up to `timeout` for the thread to finish and joins it if it did.
    pub fn join_timeout(&self, timeout: Duration) -> WaitOutcome {
        let outcome = self.finished.wait_timeout(timeout);
        if outcome.is_completed() {
            self.reap();
        }
        outcome
    }

    fn reap(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!(target: THREADS_TARGET, thread = %self.name, "managed thread panicked");
        }
    }
}

impl fmt::Debug for ManagedThread {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ManagedThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// Runs on the managed thread when its body returns or unwinds.
struct ExitSignal {
    on_exit: Option<Box<dyn FnOnce() + Send>>,
    finished: Latch,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit();
        }
        self.finished.complete();
    }
}

/// Bounds applied by [`ThreadRegistry::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainTimeouts {
    /// Bound on waiting for submitted pool tasks.
    pub pool: Duration,
    /// Bound on joining each registered thread.
    pub per_thread: Duration,
}

impl DrainTimeouts {
    /// Worst-case drain duration for `threads` registered threads, before
    /// scheduling slack.
    #[must_use]
    pub fn budget(&self, threads: usize) -> Duration {
        let threads = u32::try_from(threads).unwrap_or(u32::MAX);
        self.pool + self.per_thread.saturating_mul(threads)
    }
}

/// Summary of a completed drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// How the worker pool terminated.
    pub pool: PoolTermination,
    /// Registered threads that finished inside their bound.
    pub joined: usize,
    /// Names of threads still alive after their bound.
    pub stragglers: Vec<String>,
    /// Wall-clock duration of the drain.
    pub elapsed: Duration,
}

/// Result of calling [`ThreadRegistry::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This call performed the drain.
    Drained(DrainReport),
    /// Another call already drained, or is draining, the registry.
    AlreadyDrained,
}

struct RegistryInner {
    threads: Mutex<Vec<Arc<ManagedThread>>>,
    pool: WorkerPool,
    draining: AtomicBool,
    reporter: Arc<dyn LifecycleReporter>,
}

impl RegistryInner {
    fn tracked(&self) -> std::sync::MutexGuard<'_, Vec<Arc<ManagedThread>>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) -> Option<Arc<ManagedThread>> {
        let mut threads = self.tracked();
        let position = threads.iter().position(|thread| thread.id() == id)?;
        let removed = threads.swap_remove(position);
        drop(threads);
        info!(
            target: THREADS_TARGET,
            thread = %removed.name(),
            id,
            "thread unregistered"
        );
        Some(removed)
    }
}

/// Tracks the worker pool and every long-lived thread so shutdown can drain
/// them in bounded time. Clones share the same registry.
#[derive(Clone)]
pub struct ThreadRegistry {
    inner: Arc<RegistryInner>,
}

impl ThreadRegistry {
    /// Creates a registry owning `pool`.
    pub fn new(pool: WorkerPool, reporter: Arc<dyn LifecycleReporter>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                threads: Mutex::new(Vec::new()),
                pool,
                draining: AtomicBool::new(false),
                reporter,
            }),
        }
    }

    /// The owned worker pool.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Submits `job` to the owned worker pool.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        self.inner.pool.submit(job)
    }

    /// Tracks `thread` until it is unregistered or drained.
    ///
    /// Returns `false`, without tracking, once draining has begun.
    pub fn register(&self, thread: Arc<ManagedThread>) -> bool {
        let mut threads = self.inner.tracked();
        if self.is_draining() {
            drop(threads);
            warn!(
                target: THREADS_TARGET,
                thread = %thread.name(),
                "refusing to register thread during shutdown"
            );
            return false;
        }
        let (name, id) = (thread.name().to_owned(), thread.id());
        threads.push(thread);
        drop(threads);
        info!(target: THREADS_TARGET, thread = %name, id, "thread registered");
        true
    }

    /// Stops tracking `thread`. Returns `true` if it was tracked.
    pub fn unregister(&self, thread: &ManagedThread) -> bool {
        self.inner.remove(thread.id()).is_some()
    }

    /// Number of tracked threads, excluding pool workers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.tracked().len()
    }

    /// Returns `true` once [`Self::drain`] has been called.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Starts `body` on a registered thread that unregisters itself when it
    /// finishes.
    pub fn spawn<F>(&self, name: impl Into<String>, body: F) -> Result<BackgroundTask, ThreadError>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let thread = ManagedThread::prepare(name.into());
        if !self.register(Arc::clone(&thread)) {
            return Err(ThreadError::ShuttingDown {
                name: thread.name().to_owned(),
            });
        }
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let id = thread.id();
        let started = thread.start(body, move || {
            if let Some(inner) = registry.upgrade() {
                inner.remove(id);
            }
        });
        if let Err(error) = started {
            self.unregister(&thread);
            return Err(error);
        }
        Ok(BackgroundTask::new(thread))
    }

    /// Shuts down the pool and joins every tracked thread within bounds.
    ///
    /// Never blocks longer than `timeouts.budget(count)` plus scheduling
    /// slack. Stragglers are interrupted and reported, never waited on again.
    /// Only the first call does any work.
    pub fn drain(&self, timeouts: DrainTimeouts) -> DrainOutcome {
        // The flag flips under the registry lock, so the taken set is final.
        let tracked = {
            let mut threads = self.inner.tracked();
            if self.inner.draining.swap(true, Ordering::SeqCst) {
                drop(threads);
                debug!(target: THREADS_TARGET, "drain already performed");
                return DrainOutcome::AlreadyDrained;
            }
            std::mem::take(&mut *threads)
        };
        let started = Instant::now();
        let reporter = &self.inner.reporter;

        let pool = self.inner.pool.terminate(timeouts.pool);
        if let PoolTermination::Forced { abandoned } = pool {
            reporter.pool_forced(timeouts.pool, abandoned);
        }
        reporter.milestone(Milestone::ExecutorTerminated);

        let mut joined = 0;
        let mut stragglers = Vec::new();
        for thread in tracked {
            match thread.join_timeout(timeouts.per_thread) {
                WaitOutcome::Completed => joined += 1,
                WaitOutcome::TimedOut | WaitOutcome::Interrupted => {
                    thread.interrupt();
                    reporter.straggler(thread.name(), timeouts.per_thread);
                    stragglers.push(thread.name().to_owned());
                }
            }
        }
        reporter.milestone(Milestone::ThreadsTerminated);

        DrainOutcome::Drained(DrainReport {
            pool,
            joined,
            stragglers,
            elapsed: started.elapsed(),
        })
    }
}

impl fmt::Debug for ThreadRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ThreadRegistry")
            .field("threads", &self.count())
            .field("pool", &self.inner.pool)
            .field("draining", &self.is_draining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn instantly_finishing_thread_is_always_reaped() {
        for index in 0..200 {
            let thread = ManagedThread::spawn(format!("instant-{index}"), |_| {})
                .expect("thread should start");
            assert_eq!(
                thread.join_timeout(Duration::from_secs(2)),
                WaitOutcome::Completed
            );
            let handle = thread.handle.lock().unwrap_or_else(PoisonError::into_inner);
            assert!(handle.is_none(), "join handle left behind for {}", thread.name());
        }
    }
}
