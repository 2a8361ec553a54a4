//! Shared configuration for the roster application.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file, then `ROSTER_*` environment variables, then command
//! line flags. Only the process lifecycle is configured here; the record
//! forms and CSV collaborators carry their own settings.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_EVENT_LOOP_TIMEOUT, DEFAULT_LOCK_PORT, DEFAULT_LOG_FILTER, DEFAULT_POOL_SIZE,
    DEFAULT_POOL_TIMEOUT, DEFAULT_THREAD_TIMEOUT,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Command line flags owned by the configuration loader.
///
/// Callers that accept their own flags use this list to route arguments to
/// [`Config::load_from_args`].
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--lock-port",
    "--log-filter",
    "--log-format",
    "--pool-size",
    "--pool-timeout-ms",
    "--thread-timeout-ms",
    "--event-loop-timeout-ms",
];

/// Lifecycle configuration resolved at process start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "ROSTER")]
pub struct Config {
    /// Loopback port used as the single-instance lock.
    #[serde(default = "defaults::default_lock_port")]
    pub lock_port: u16,
    /// `tracing` filter directive, e.g. `info` or `roster_app=debug`.
    #[serde(default = "defaults::default_log_filter")]
    pub log_filter: String,
    /// Output format for log lines.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Number of workers in the background pool.
    #[serde(default = "defaults::default_pool_size")]
    pub pool_size: usize,
    /// Bound on waiting for pool tasks during shutdown, in milliseconds.
    #[serde(default = "defaults::default_pool_timeout_ms")]
    pub pool_timeout_ms: u64,
    /// Bound on joining each registered thread during shutdown, in milliseconds.
    #[serde(default = "defaults::default_thread_timeout_ms")]
    pub thread_timeout_ms: u64,
    /// Bound on stopping the UI event loop during shutdown, in milliseconds.
    #[serde(default = "defaults::default_event_loop_timeout_ms")]
    pub event_loop_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_port: defaults::default_lock_port(),
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
            pool_size: defaults::default_pool_size(),
            pool_timeout_ms: defaults::default_pool_timeout_ms(),
            thread_timeout_ms: defaults::default_thread_timeout_ms(),
            event_loop_timeout_ms: defaults::default_event_loop_timeout_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments, environment and files.
    ///
    /// The first element of `args` is treated as the binary name.
    pub fn load_from_args<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        Self::load_from_iter(args)
    }

    /// Loopback port used as the single-instance lock.
    #[must_use]
    pub const fn lock_port(&self) -> u16 {
        self.lock_port
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Worker pool size, never less than one.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size.max(1)
    }

    /// Bound on waiting for submitted pool tasks during shutdown.
    #[must_use]
    pub const fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    /// Bound on joining each registered thread during shutdown.
    #[must_use]
    pub const fn thread_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_timeout_ms)
    }

    /// Bound on stopping the UI event loop during shutdown.
    #[must_use]
    pub const fn event_loop_timeout(&self) -> Duration {
        Duration::from_millis(self.event_loop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.lock_port(), DEFAULT_LOCK_PORT);
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.pool_timeout(), DEFAULT_POOL_TIMEOUT);
        assert_eq!(config.thread_timeout(), DEFAULT_THREAD_TIMEOUT);
        assert_eq!(config.event_loop_timeout(), DEFAULT_EVENT_LOOP_TIMEOUT);
    }

    #[rstest]
    fn pool_size_is_clamped_to_one() {
        let config = Config {
            pool_size: 0,
            ..Config::default()
        };
        assert_eq!(config.pool_size(), 1);
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("COMPACT", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] raw: &str, #[case] expected: LogFormat) {
        let parsed: LogFormat = raw.parse().expect("log format should parse");
        assert_eq!(parsed, expected);
    }
}
