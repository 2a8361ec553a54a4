use std::time::Duration;

/// TCP port bound on loopback to detect a second running instance.
pub const DEFAULT_LOCK_PORT: u16 = 54321;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Number of workers in the fixed background pool.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Upper bound on waiting for submitted pool tasks during shutdown.
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on joining each registered thread during shutdown.
pub const DEFAULT_THREAD_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on stopping the UI event loop during shutdown.
pub const DEFAULT_EVENT_LOOP_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn default_lock_port() -> u16 {
    DEFAULT_LOCK_PORT
}

pub(crate) fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

pub(crate) fn default_log_format() -> crate::LogFormat {
    crate::LogFormat::Compact
}

pub(crate) fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

pub(crate) fn default_pool_timeout_ms() -> u64 {
    millis(DEFAULT_POOL_TIMEOUT)
}

pub(crate) fn default_thread_timeout_ms() -> u64 {
    millis(DEFAULT_THREAD_TIMEOUT)
}

pub(crate) fn default_event_loop_timeout_ms() -> u64 {
    millis(DEFAULT_EVENT_LOOP_TIMEOUT)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
