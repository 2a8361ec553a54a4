//! The UI collaborator driven by the lifecycle controller.
//!
//! Window layout, forms and the record model live behind [`Frontend`]; the
//! controller only sequences the calls and reacts to their failures.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::LIFECYCLE_TARGET;
use crate::process::{ShutdownReason, ShutdownTrigger};
use crate::threads::CancelToken;

/// UI construction step that can fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    /// Building the main window.
    MainWindow,
    /// Connecting the controller to the window.
    Controller,
    /// Loading the initial record set.
    InitialLoad,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::MainWindow => "main window construction",
            Self::Controller => "controller wiring",
            Self::InitialLoad => "initial data load",
        })
    }
}

/// Failure reported by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FrontendError {
    message: String,
}

impl FrontendError {
    /// Wraps a human-readable failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Handle the UI uses to report that the main window was closed.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    trigger: ShutdownTrigger,
}

impl CloseHandle {
    /// Binds the handle to the application's shutdown trigger.
    #[must_use]
    pub const fn new(trigger: ShutdownTrigger) -> Self {
        Self { trigger }
    }

    /// Requests shutdown. Returns `false` if shutdown was already underway.
    pub fn close_window(&self) -> bool {
        self.trigger.trigger(ShutdownReason::WindowClosed)
    }
}

/// UI operations invoked during startup.
///
/// `build_main_window` and `wire_controller` run on the event thread;
/// `load_initial_data` runs on a pool worker.
#[cfg_attr(test, mockall::automock)]
pub trait Frontend: Send + Sync {
    /// Constructs the main window.
    fn build_main_window(&self) -> Result<(), FrontendError>;

    /// Connects the controller, handing over the window-close path.
    fn wire_controller(&self, close: CloseHandle) -> Result<(), FrontendError>;

    /// Loads the initial records and returns how many were read.
    fn load_initial_data(&self, cancel: &CancelToken) -> Result<usize, FrontendError>;
}

/// Frontend with no visible window, used by the binary's test mode.
#[derive(Default)]
pub struct HeadlessFrontend {
    records: Option<PathBuf>,
    load_delay: Duration,
    close: Mutex<Option<CloseHandle>>,
}

impl HeadlessFrontend {
    /// A frontend that loads nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the initial records from the CSV file at `path`.
    #[must_use]
    pub fn with_records(mut self, path: impl Into<PathBuf>) -> Self {
        self.records = Some(path.into());
        self
    }

    /// Holds the initial load for `delay`, or until cancelled.
    #[must_use]
    pub const fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Simulates the user closing the main window.
    ///
    /// Returns `false` before the controller is wired or when shutdown had
    /// already started.
    pub fn close_window(&self) -> bool {
        self.close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(CloseHandle::close_window)
    }
}

impl fmt::Debug for HeadlessFrontend {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HeadlessFrontend")
            .field("records", &self.records)
            .field("load_delay", &self.load_delay)
            .finish_non_exhaustive()
    }
}

impl Frontend for HeadlessFrontend {
    fn build_main_window(&self) -> Result<(), FrontendError> {
        debug!(target: LIFECYCLE_TARGET, "headless main window ready");
        Ok(())
    }

    fn wire_controller(&self, close: CloseHandle) -> Result<(), FrontendError> {
        *self.close.lock().unwrap_or_else(PoisonError::into_inner) = Some(close);
        Ok(())
    }

    fn load_initial_data(&self, cancel: &CancelToken) -> Result<usize, FrontendError> {
        if !self.load_delay.is_zero() && cancel.sleep(self.load_delay) {
            return Err(FrontendError::new("initial load cancelled"));
        }
        let Some(path) = &self.records else {
            return Ok(0);
        };
        let contents = fs::read_to_string(path).map_err(|error| {
            FrontendError::new(format!("cannot read '{}': {error}", path.display()))
        })?;
        // The first line is the column header.
        let records = contents
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .count();
        info!(
            target: LIFECYCLE_TARGET,
            records,
            path = %path.display(),
            "initial records loaded"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    fn counts_records_below_the_header() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("engineers.csv");
        fs::write(&path, "id,name\n1,Ada\n2,Grace\n\n").expect("write csv");
        let frontend = HeadlessFrontend::new().with_records(&path);
        let records = frontend
            .load_initial_data(&CancelToken::new())
            .expect("load records");
        assert_eq!(records, 2);
    }

    #[rstest]
    fn missing_file_is_reported() {
        let frontend = HeadlessFrontend::new().with_records("/nonexistent/roster.csv");
        let error = frontend
            .load_initial_data(&CancelToken::new())
            .expect_err("file missing");
        assert!(error.to_string().contains("cannot read"));
    }

    #[rstest]
    fn cancellation_ends_a_delayed_load() {
        let frontend = HeadlessFrontend::new().with_load_delay(Duration::from_secs(10));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(frontend.load_initial_data(&cancel).is_err());
    }

    #[rstest]
    fn close_window_requires_wiring() {
        let frontend = HeadlessFrontend::new();
        assert!(!frontend.close_window());
        let trigger = ShutdownTrigger::new();
        frontend
            .wire_controller(CloseHandle::new(trigger.clone()))
            .expect("wire");
        assert!(frontend.close_window());
        assert!(!frontend.close_window());
        assert_eq!(trigger.reason(), Some(ShutdownReason::WindowClosed));
    }
}
