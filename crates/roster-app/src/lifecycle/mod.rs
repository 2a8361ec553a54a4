//! Application lifecycle: phases, the event thread, the UI collaborator and
//! the controller that sequences them.

mod context;
mod controller;
mod event_loop;
mod frontend;
mod phase;

pub use context::LifecycleContext;
pub use controller::{
    LaunchPlan, ProcessControl, RunningApp, ServiceDeps, launch, run_application,
};
pub use event_loop::{EventLoop, EventLoopError};
#[cfg(test)]
pub(crate) use frontend::MockFrontend;
pub use frontend::{CloseHandle, Frontend, FrontendError, HeadlessFrontend, StartupStage};
pub use phase::{LifecyclePhase, PhaseError, PhaseTracker};

pub(crate) const LIFECYCLE_TARGET: &str = "roster_app::lifecycle";
