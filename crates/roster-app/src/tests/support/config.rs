//! Configuration and reporter fixtures.

use std::sync::Arc;

use roster_config::Config;

use crate::milestones::RecordingReporter;

/// Configuration with an ephemeral lock port and short shutdown bounds.
pub fn test_config() -> Config {
    Config {
        lock_port: 0,
        log_filter: "warn".to_owned(),
        pool_size: 2,
        pool_timeout_ms: 2_000,
        thread_timeout_ms: 1_000,
        event_loop_timeout_ms: 1_000,
        ..Config::default()
    }
}

/// Reporter that records events without logging them.
pub fn recording_reporter() -> Arc<RecordingReporter> {
    Arc::new(RecordingReporter::new())
}
