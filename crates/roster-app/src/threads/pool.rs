//! Fixed-size worker pool with bounded, two-stage termination.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::THREADS_TARGET;
use super::latch::{CancelToken, Latch, WaitOutcome};

type Job = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

/// Errors raised by [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool stopped accepting work.
    #[error("worker pool '{pool}' is shut down; task rejected")]
    Rejected {
        /// Name of the pool.
        pool: String,
    },
    /// A worker thread could not be started.
    #[error("failed to spawn worker {index} for pool '{pool}': {source}")]
    Spawn {
        /// Name of the pool.
        pool: String,
        /// Zero-based worker index.
        index: usize,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// How the pool reached termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolTermination {
    /// Every submitted task finished inside the bound.
    Completed,
    /// The bound elapsed; the pool was cancelled.
    Forced {
        /// Queued tasks dropped without running.
        abandoned: usize,
    },
}

struct WorkerExit {
    live: Arc<AtomicUsize>,
    all_exited: Latch,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.all_exited.complete();
        }
    }
}

/// Fixed-size pool executing submitted closures.
///
/// Once [`WorkerPool::shutdown`] runs, every later submission is rejected.
pub struct WorkerPool {
    name: String,
    size: usize,
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Arc<Mutex<Receiver<Job>>>,
    accepting: AtomicBool,
    cancel: CancelToken,
    pending: Arc<AtomicUsize>,
    all_exited: Latch,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `size` workers (at least one) named after `name`.
    pub fn new(name: &str, size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancelToken::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(size));
        let all_exited = Latch::new();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let worker = Worker {
                receiver: Arc::clone(&receiver),
                cancel: cancel.clone(),
                pending: Arc::clone(&pending),
                exit: WorkerExit {
                    live: Arc::clone(&live),
                    all_exited: all_exited.clone(),
                },
            };
            let handle = thread::Builder::new()
                .name(format!("{name}-worker-{index}"))
                .spawn(move || worker.run())
                .map_err(|source| PoolError::Spawn {
                    pool: name.to_owned(),
                    index,
                    source,
                })?;
            workers.push(handle);
        }
        debug!(target: THREADS_TARGET, pool = name, size, "worker pool started");

        Ok(Self {
            name: name.to_owned(),
            size,
            sender: Mutex::new(Some(sender)),
            receiver,
            accepting: AtomicBool::new(true),
            cancel,
            pending,
            all_exited,
            workers: Mutex::new(workers),
        })
    }

    /// Pool name used for thread names and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of workers.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Tasks queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Returns `true` once intake has stopped.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }

    /// Queues `job` for execution.
    ///
    /// The job receives the pool's cancellation token, which is set when the
    /// pool is forcibly terminated.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(self.rejected());
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(Box::new(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(self.rejected());
        }
        Ok(())
    }

    /// Stops accepting tasks; queued tasks still run.
    ///
    /// Returns `true` for the call that stopped intake.
    pub fn shutdown(&self) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.accepting.store(false, Ordering::SeqCst);
        let stopped = sender.is_some();
        if stopped {
            debug!(
                target: THREADS_TARGET,
                pool = %self.name,
                pending = self.pending(),
                "worker pool intake stopped"
            );
        }
        stopped
    }

    /// Waits up to `timeout` for every worker to exit after [`Self::shutdown`].
    pub fn await_termination(&self, timeout: Duration) -> WaitOutcome {
        self.all_exited.wait_timeout(timeout)
    }

    /// Cancels the pool: running jobs see the token, queued jobs are dropped.
    ///
    /// Returns the number of queued jobs dropped here. Workers are not waited
    /// for.
    pub fn shutdown_now(&self) -> usize {
        self.shutdown();
        self.cancel.cancel();
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        let mut abandoned = 0;
        while receiver.try_recv().is_ok() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            abandoned += 1;
        }
        abandoned
    }

    /// Stops intake, waits up to `timeout`, and cancels on overrun.
    pub fn terminate(&self, timeout: Duration) -> PoolTermination {
        self.shutdown();
        if self.await_termination(timeout).is_completed() {
            for handle in self.take_workers() {
                if handle.join().is_err() {
                    warn!(target: THREADS_TARGET, pool = %self.name, "worker exited by panic");
                }
            }
            info!(target: THREADS_TARGET, pool = %self.name, "worker pool terminated");
            return PoolTermination::Completed;
        }
        let abandoned = self.shutdown_now();
        // Workers still inside a job are detached and exit once it returns.
        drop(self.take_workers());
        PoolTermination::Forced { abandoned }
    }

    fn take_workers(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn rejected(&self) -> PoolError {
        PoolError::Rejected {
            pool: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    receiver: Arc<Mutex<Receiver<Job>>>,
    cancel: CancelToken,
    pending: Arc<AtomicUsize>,
    exit: WorkerExit,
}

impl Worker {
    fn run(self) {
        let Self {
            receiver,
            cancel,
            pending,
            exit: _exit,
        } = self;
        loop {
            let next = receiver
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv();
            let Ok(job) = next else {
                break;
            };
            if cancel.is_cancelled() {
                debug!(target: THREADS_TARGET, "dropping queued task after cancellation");
            } else if panic::catch_unwind(AssertUnwindSafe(|| job(&cancel))).is_err() {
                warn!(target: THREADS_TARGET, "pool task panicked");
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
