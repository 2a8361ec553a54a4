//! Worker pool, managed threads and the shutdown drain.

mod latch;
mod pool;
mod registry;
mod task;

pub use latch::{CancelToken, Latch, WaitOutcome};
pub use pool::{PoolError, PoolTermination, WorkerPool};
pub use registry::{
    DrainOutcome, DrainReport, DrainTimeouts, ManagedThread, ThreadError, ThreadRegistry,
};
pub use task::BackgroundTask;

pub(crate) const THREADS_TARGET: &str = "roster_app::threads";
