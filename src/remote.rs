//! Command execution on cluster nodes
//!
//! The SSH transport itself is provided by the caller through the
//! [`Remote`] trait. [`LocalShell`] runs commands on the local host.

use std::process::{Command, Output};

use anyhow::Context;
use tracing::debug;

use crate::error::{Error, Result, WaitError};
use crate::wait::WaitSpec;

/// Result of a command executed on a node
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteResult {
    pub exit_status: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl RemoteResult {
    /// Creates a result and splits the given output into lines.
    pub fn new(exit_status: i32, stdout: &str, stderr: &str) -> Self {
        RemoteResult {
            exit_status,
            stdout: to_lines(stdout),
            stderr: to_lines(stderr),
        }
    }

    /// Creates a result from the output of a local process.
    ///
    /// A process terminated by a signal has no exit code and is
    /// reported with the exit status -1.
    pub fn from_output(output: &Output) -> Self {
        RemoteResult::new(
            output.status.code().unwrap_or(-1),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    /// Checks if the command terminated successfully.
    pub fn is_ok(&self) -> bool {
        self.exit_status == 0
    }

    pub fn stdout_string(&self) -> String {
        self.stdout.join("\n")
    }

    pub fn stderr_string(&self) -> String {
        self.stderr.join("\n")
    }

    /// Returns the result if the command succeeded and an
    /// [`Error::Command`] otherwise.
    pub fn check(self, command: &str) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::Command {
                command: command.to_owned(),
                result: self,
            })
        }
    }
}

fn to_lines(output: &str) -> Vec<String> {
    output.lines().map(|line| line.to_owned()).collect()
}

/// Something which can execute shell commands, usually an SSH session
/// to a cluster node
pub trait Remote {
    /// Executes the command and returns its result.
    ///
    /// An error is only returned if the command could not be run at
    /// all. A non-zero exit status is part of the result.
    fn execute(&mut self, command: &str) -> anyhow::Result<RemoteResult>;

    /// Executes the command and fails if it does not succeed.
    fn check_call(&mut self, command: &str) -> Result<RemoteResult> {
        self.execute(command)?.check(command)
    }
}

impl<R: Remote + ?Sized> Remote for &mut R {
    fn execute(&mut self, command: &str) -> anyhow::Result<RemoteResult> {
        (**self).execute(command)
    }
}

impl<R: Remote + ?Sized> Remote for Box<R> {
    fn execute(&mut self, command: &str) -> anyhow::Result<RemoteResult> {
        (**self).execute(command)
    }
}

/// Executes commands with `sh -c` on the local host
#[derive(Clone, Debug)]
pub struct LocalShell {
    shell: String,
}

impl Default for LocalShell {
    fn default() -> Self {
        LocalShell {
            shell: String::from("sh"),
        }
    }
}

impl LocalShell {
    pub fn new() -> Self {
        LocalShell::default()
    }

    /// Uses the given shell instead of `sh`, e.g. `bash` for commands
    /// relying on `|&`.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        LocalShell {
            shell: shell.into(),
        }
    }
}

impl Remote for LocalShell {
    fn execute(&mut self, command: &str) -> anyhow::Result<RemoteResult> {
        debug!("Executing [{}] with {}", command, self.shell);
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .output()
            .with_context(|| format!("Command [{}] could not be started", command))?;
        Ok(RemoteResult::from_output(&output))
    }
}

/// Repeats the command until it succeeds and returns the successful
/// result.
///
/// Errors while executing the command abort the wait unless they are
/// tolerated by `spec`.
pub fn wait_for_success<R>(
    remote: &mut R,
    command: &str,
    spec: &WaitSpec,
) -> std::result::Result<RemoteResult, WaitError>
where
    R: Remote + ?Sized,
{
    let mut last_result = None;
    spec.wait(|| {
        let result = remote.execute(command)?;
        let succeeded = result.is_ok();
        last_result = Some(result);
        Ok::<_, anyhow::Error>(succeeded)
    })?;
    Ok(last_result.unwrap_or_default())
}
