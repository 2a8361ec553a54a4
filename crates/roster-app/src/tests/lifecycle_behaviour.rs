//! Behavioural tests covering startup, shutdown and single-instance locking.

use std::cell::RefCell;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::milestones::{Milestone, appear_in_order};
use crate::process::SingletonLock;

use super::support::{LifecycleWorld, StepResult};

const SHUTDOWN_SLACK: Duration = Duration::from_millis(500);

#[fixture]
fn world() -> RefCell<LifecycleWorld> {
    RefCell::new(LifecycleWorld::new())
}

#[given("a lifecycle on an ephemeral lock port")]
fn given_lifecycle(world: &RefCell<LifecycleWorld>) {
    assert_eq!(world.borrow().config.lock_port, 0);
}

#[when("the application is launched")]
fn when_launched(world: &RefCell<LifecycleWorld>) -> StepResult {
    world.borrow_mut().launch()
}

#[when("the window is closed and a termination signal follows")]
fn when_close_then_signal(world: &RefCell<LifecycleWorld>) -> StepResult {
    world.borrow_mut().close_then_signal()
}

#[when("the application finishes")]
fn when_finishes(world: &RefCell<LifecycleWorld>) -> StepResult {
    world.borrow_mut().wait()
}

#[when("a second instance is launched on the same port")]
fn when_second_launched(world: &RefCell<LifecycleWorld>) -> StepResult {
    world.borrow_mut().launch_second()
}

#[then("startup milestones were reported in order")]
fn then_startup_in_order(world: &RefCell<LifecycleWorld>) {
    let milestones = world.borrow().reporter.milestones();
    assert!(
        appear_in_order(&milestones, &Milestone::STARTUP),
        "unexpected order: {milestones:?}"
    );
}

#[then("only the window close took effect")]
fn then_first_trigger_wins(world: &RefCell<LifecycleWorld>) {
    assert_eq!(world.borrow().triggers, Some((true, false)));
}

#[then("the application stopped cleanly")]
fn then_stopped(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    let result = world.result.as_ref().expect("application should have finished");
    assert!(result.is_ok(), "shutdown failed: {result:?}");
}

#[then("each shutdown milestone was reported once")]
fn then_shutdown_once(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    for milestone in Milestone::SHUTDOWN {
        assert_eq!(world.reporter.count(milestone), 1, "{milestone}");
    }
}

#[then("shutdown finished within its bound")]
fn then_within_bound(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    let elapsed = world.shutdown_elapsed.expect("shutdown should be timed");
    let config = &world.config;
    let bound = config.event_loop_timeout()
        + config.pool_timeout()
        + config.thread_timeout()
        + SHUTDOWN_SLACK;
    assert!(elapsed <= bound, "shutdown took {elapsed:?}");
}

#[then("the lock port can be bound again")]
fn then_port_free(world: &RefCell<LifecycleWorld>) {
    let port = world.borrow().port.expect("port should be recorded");
    SingletonLock::acquire(port).expect("lock port should be free");
}

#[then("the second instance is rejected as already running")]
fn then_second_rejected(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    match world.second.as_ref() {
        Some(Err(error)) => assert!(error.is_duplicate_instance(), "unexpected: {error}"),
        Some(Ok(_)) => panic!("second instance should not start"),
        None => panic!("second instance was not launched"),
    }
}

#[scenario(path = "tests/features/lifecycle_shutdown.feature")]
fn lifecycle_shutdown(#[from(world)] _: RefCell<LifecycleWorld>) -> Result<(), String> {
    Ok(())
}

#[scenario(path = "tests/features/duplicate_instance.feature")]
fn duplicate_instance(#[from(world)] _: RefCell<LifecycleWorld>) -> Result<(), String> {
    Ok(())
}
