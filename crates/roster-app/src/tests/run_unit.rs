//! Exit status and console output of the `roster` entry point.

use std::ffi::OsString;
use std::process::ExitCode;

use rstest::rstest;
use tempfile::TempDir;

use crate::process::SingletonLock;
use crate::run;

struct Outcome {
    code: ExitCode,
    stdout: String,
    stderr: String,
}

fn invoke<I, S>(args: I) -> Outcome
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let argv = std::iter::once(OsString::from("roster")).chain(args.into_iter().map(Into::into));
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run(argv, &mut stdout, &mut stderr);
    Outcome {
        code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}

fn exited_with(code: ExitCode, expected: ExitCode) -> bool {
    format!("{code:?}") == format!("{expected:?}")
}

#[rstest]
fn held_lock_port_exits_with_failure_and_says_already_running() {
    let held = SingletonLock::acquire(0).expect("ephemeral bind should succeed");
    let port = held.port().to_string();

    let outcome = invoke(["--lock-port", port.as_str(), "--log-filter", "warn"]);

    assert!(exited_with(outcome.code, ExitCode::FAILURE));
    assert!(
        outcome.stderr.contains("already running"),
        "stderr: {}",
        outcome.stderr
    );
}

#[rstest]
fn passing_self_test_exits_successfully_and_writes_reports() {
    let dir = TempDir::new().expect("temp dir");
    let output = dir.path().join("reports");

    let outcome = invoke([
        OsString::from("--test=startup"),
        OsString::from("--output"),
        output.clone().into_os_string(),
        OsString::from("--log-filter=warn"),
    ]);

    assert!(exited_with(outcome.code, ExitCode::SUCCESS), "stderr: {}", outcome.stderr);
    assert!(outcome.stdout.contains("PASS startup"), "stdout: {}", outcome.stdout);
    assert!(output.join("startup.json").is_file());
    assert!(output.join("summary.json").is_file());
}

#[rstest]
#[case::unknown_scenario(&["--test=bogus"])]
#[case::unknown_flag(&["--no-such-flag"])]
fn invalid_arguments_exit_with_failure(#[case] args: &[&str]) {
    let outcome = invoke(args.iter().copied());

    assert!(exited_with(outcome.code, ExitCode::FAILURE));
    assert!(!outcome.stderr.is_empty());
    assert!(outcome.stdout.is_empty());
}

#[rstest]
fn help_goes_to_stdout_and_succeeds() {
    let outcome = invoke(["--help"]);

    assert!(exited_with(outcome.code, ExitCode::SUCCESS));
    assert!(outcome.stdout.contains("--test"), "stdout: {}", outcome.stdout);
}
