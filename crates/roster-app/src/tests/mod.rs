//! Test suites for the lifecycle coordinator.

mod controller_unit;
mod drain_behaviour;
mod lifecycle_behaviour;
mod run_unit;
mod support;
