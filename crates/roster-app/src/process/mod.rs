//! Process-level concerns: the instance lock, shutdown triggers and the
//! lifecycle error surface.

mod errors;
pub(crate) mod files;
mod lock;
mod shutdown;

pub use errors::LifecycleError;
pub use lock::{LockError, LockHandle, SingletonLock};
pub use shutdown::{
    NoSignals, ShutdownError, ShutdownReason, ShutdownTrigger, SignalGuard, SignalSource,
    SystemShutdownSignal,
};

pub(crate) const PROCESS_TARGET: &str = "roster_app::process";
