mod util;

use std::time::Duration;

use anyhow::Result;
use mos_integration_tests::remote::wait_for_success;
use mos_integration_tests::{Error, LocalShell, Remote, RemoteResult, WaitSpec};
use spectral::prelude::*;
use util::fakes::ScriptedRemote;

#[test]
fn local_shell_should_capture_exit_status_and_output() -> Result<()> {
    let mut shell = LocalShell::new();

    let result = shell.execute("printf 'line 1\\nline 2\\n'; echo 'oops' >&2; exit 3")?;

    assert_that(&result.exit_status).is_equal_to(3);
    assert_that(&result.stdout).is_equal_to(vec![String::from("line 1"), String::from("line 2")]);
    assert_that(&result.stderr_string()).is_equal_to(String::from("oops"));
    assert_that(&result.is_ok()).is_false();
    Ok(())
}

#[test]
fn check_call_should_fail_on_a_non_zero_exit_status() {
    let mut shell = LocalShell::new();

    assert_that(&shell.check_call("true")).is_ok();

    match shell.check_call("echo 'permission denied' >&2; exit 1") {
        Err(Error::Command { command, result }) => {
            assert_that(&command).contains("permission denied");
            assert_that(&result.exit_status).is_equal_to(1);
            assert_that(&result.stderr).is_equal_to(vec![String::from("permission denied")]);
        }
        other => panic!("command error expected but got {:?}", other),
    }
}

#[test]
fn command_error_should_show_the_exit_status_and_stderr() {
    let error = RemoteResult::new(127, "", "pcs: command not found")
        .check("pcs status")
        .unwrap_err();

    assert_that(&error.to_string()).is_equal_to(String::from(
        "Command [pcs status] failed with exit status 127: pcs: command not found",
    ));
}

#[test]
fn stdout_lines_should_be_joined() {
    let result = RemoteResult::new(0, "a\nb\n", "");

    assert_that(&result.stdout).has_length(2);
    assert_that(&result.stdout_string()).is_equal_to(String::from("a\nb"));
    assert_that(&result.stderr).is_empty();
}

#[test]
fn command_should_be_repeated_until_it_succeeds() -> Result<()> {
    let mut remote = ScriptedRemote::new()
        .then_stdout(1, "")
        .then_stdout(1, "")
        .then_stdout(0, "64 bytes from 10.0.0.5");
    let spec = WaitSpec::new("instance to answer pings").with_interval(Duration::from_millis(10));

    let result = wait_for_success(&mut remote, "ping -c1 10.0.0.5", &spec)?;

    assert_that(&result.stdout_string()).is_equal_to(String::from("64 bytes from 10.0.0.5"));
    assert_that(&remote.commands).has_length(3);
    Ok(())
}

#[test]
fn failing_transport_should_abort_the_wait() {
    let mut remote = ScriptedRemote::new()
        .then_stdout(1, "")
        .then_error(anyhow::anyhow!("SSH session closed"));
    let spec = WaitSpec::new("instance to answer pings").with_interval(Duration::from_millis(10));

    let error = wait_for_success(&mut remote, "ping -c1 10.0.0.5", &spec).unwrap_err();

    assert_that(&error.is_probe_error()).is_true();
    assert_that(&remote.commands).has_length(2);
}

#[test]
fn another_shell_should_be_selectable() -> Result<()> {
    let mut shell = LocalShell::with_shell("bash");

    let result = shell.check_call("echo 'active (running)' |& grep -o active")?;

    assert_that(&result.stdout_string()).is_equal_to(String::from("active"));
    Ok(())
}

#[test]
fn process_killed_by_a_signal_should_have_exit_status_minus_one() -> Result<()> {
    let mut shell = LocalShell::new();

    let result = shell.execute("kill -9 $$")?;

    assert_that(&result.exit_status).is_equal_to(-1);
    assert_that(&result.is_ok()).is_false();
    Ok(())
}
