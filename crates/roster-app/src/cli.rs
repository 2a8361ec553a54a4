//! Command-line surface of the `roster` binary.
//!
//! Configuration flags (see [`roster_config::CONFIG_CLI_FLAGS`]) are peeled
//! off before clap sees the rest, so both parsers stay strict.

use std::ffi::{OsStr, OsString};

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};

use roster_config::CONFIG_CLI_FLAGS;

use crate::harness::Scenario;

/// Scenario selection for test mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum TestSelection {
    /// Startup milestones and the duplicate-instance check.
    Startup,
    /// Double-trigger shutdown and drain bounds.
    Shutdown,
    /// CSV export and import through the worker pool.
    Csv,
    /// Every scenario in turn.
    All,
}

impl TestSelection {
    pub(crate) const fn scenarios(self) -> &'static [Scenario] {
        match self {
            Self::Startup => &[Scenario::Startup],
            Self::Shutdown => &[Scenario::Shutdown],
            Self::Csv => &[Scenario::Csv],
            Self::All => &[Scenario::Startup, Scenario::Shutdown, Scenario::Csv],
        }
    }
}

/// Engineer roster application.
#[derive(Parser, Debug)]
#[command(name = "roster", version)]
pub(crate) struct Cli {
    /// Runs a self-test scenario instead of the interactive application.
    #[arg(long, value_enum, value_name = "SCENARIO")]
    pub(crate) test: Option<TestSelection>,
    /// Directory receiving the JSON test reports.
    #[arg(long, value_name = "DIR", default_value = "test-reports")]
    pub(crate) output: Utf8PathBuf,
}

/// Arguments partitioned between the configuration loader and clap.
///
/// Both vectors keep the program name in position zero.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    pub(crate) config: Vec<OsString>,
    pub(crate) cli: Vec<OsString>,
}

enum FlagKind {
    Config { needs_value: bool },
    Other,
}

fn classify(argument: &OsStr) -> FlagKind {
    let Some(text) = argument.to_str() else {
        return FlagKind::Other;
    };
    let (name, inline_value) = match text.split_once('=') {
        Some((name, _)) => (name, true),
        None => (text, false),
    };
    if CONFIG_CLI_FLAGS.contains(&name) {
        FlagKind::Config {
            needs_value: !inline_value,
        }
    } else {
        FlagKind::Other
    }
}

/// Splits `args` into configuration flags (with their values) and the rest.
pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ArgumentSplit::default();
    };
    let mut split = ArgumentSplit {
        config: vec![program.clone()],
        cli: vec![program.clone()],
    };
    let mut iter = rest.iter();
    while let Some(argument) = iter.next() {
        match classify(argument) {
            FlagKind::Config { needs_value } => {
                split.config.push(argument.clone());
                if needs_value && let Some(value) = iter.next() {
                    split.config.push(value.clone());
                }
            }
            FlagKind::Other => split.cli.push(argument.clone()),
        }
    }
    split
}
