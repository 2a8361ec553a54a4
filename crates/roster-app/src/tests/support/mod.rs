//! Shared fixtures for the lifecycle test suites.

mod config;
mod world;

pub use config::{recording_reporter, test_config};
pub use world::{LifecycleWorld, StepResult};
