//! Checks of the RabbitMQ cluster on the controllers
//!
//! RabbitMQ runs as the pacemaker resource `p_rabbitmq-server` on the
//! controllers and as a plain system service on the master node. The
//! functions here build the commands, parse their output, and wait for
//! the cluster to settle.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};

use crate::error::{Result, WaitError};
use crate::remote::{Remote, RemoteResult};
use crate::wait::WaitSpec;

/// Counts the rabbit resources which are started or promoted to master
pub const RUNNING_NODES_COMMAND: &str = "pcs status --full | \
    grep p_rabbitmq-server | \
    grep ocf | \
    grep -c -E \"Master|Started\"";

/// Shows the launch parameters of the rabbit resource
pub const RESOURCE_COMMAND: &str = "pcs resource show p_rabbitmq-server";

pub const LIST_POLICIES_COMMAND: &str = "rabbitmqctl list_policies";

/// Counts the HiPE precompiled `.beam` files in the native code
/// directories the rabbit process was started with
pub const HIPE_FILES_COMMAND: &str = "ls -la $(for i in $(ps aux | grep rabbitmq ); \
    do echo $i | grep \"native\"; done) | grep -c \".beam\"";

pub const CPU_COUNT_COMMAND: &str = "grep -c ^processor /proc/cpuinfo";

/// Extracts the `-A` argument of the rabbit beam process
pub const ASYNC_THREAD_POOL_COMMAND: &str =
    r#"ps ax | perl -nE '/beam.*-sname rabbit/ && /^\s*(\d+).*?-A (\d+)/ && say $2'"#;

pub const MIN_ASYNC_THREAD_POOL_SIZE: usize = 64;
pub const MAX_ASYNC_THREAD_POOL_SIZE: usize = 1024;

/// Words which must not show up when the service is started or stopped
pub const ERROR_WORDS: [&str; 3] = ["segfault", "error", "failed"];

/// Parses the output of [`RUNNING_NODES_COMMAND`].
///
/// Anything which is not a plain number counts as no running nodes.
pub fn parse_running_nodes(stdout: &[String]) -> usize {
    parse_grep_count(stdout)
}

fn parse_grep_count(stdout: &[String]) -> usize {
    stdout
        .first()
        .map(|line| line.trim())
        .filter(|count| !count.is_empty() && count.chars().all(|c| c.is_ascii_digit()))
        .and_then(|count| count.parse().ok())
        .unwrap_or(0)
}

/// Returns the number of rabbit nodes which pacemaker reports as
/// running.
pub fn running_nodes<R: Remote + ?Sized>(remote: &mut R) -> anyhow::Result<usize> {
    // grep -c exits with 1 if nothing matches, so the exit status is
    // not checked.
    let result = remote.execute(RUNNING_NODES_COMMAND)?;
    Ok(parse_running_nodes(&result.stdout))
}

/// Wait for the given number of running nodes with the usual timing of
/// 5 minutes and a poll every 30 seconds
pub fn running_nodes_spec(expected: usize) -> WaitSpec {
    WaitSpec::new(format!("number of running nodes will be {}", expected))
        .with_timeout(Duration::from_secs(5 * 60))
        .with_interval(Duration::from_secs(30))
}

/// Waits until pacemaker reports exactly `expected` running rabbit
/// nodes, e.g. after a snapshot of the environment was reverted.
pub fn wait_for_running_nodes<R: Remote + ?Sized>(
    remote: &mut R,
    expected: usize,
    spec: &WaitSpec,
) -> std::result::Result<(), WaitError> {
    spec.wait(|| running_nodes(&mut *remote).map(|count| count == expected))
}

/// HA flags of the rabbit resource
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HaSettings {
    /// `enable_notifications_ha`; `None` if missing or contradictory
    pub notifications: Option<bool>,
    /// `enable_rpc_ha`; `None` if missing or contradictory
    pub rpc: Option<bool>,
}

impl HaSettings {
    /// Parses the output of [`RESOURCE_COMMAND`].
    pub fn parse(lines: &[String]) -> Self {
        HaSettings {
            notifications: parse_flag(lines, "enable_notifications_ha"),
            rpc: parse_flag(lines, "enable_rpc_ha"),
        }
    }

    /// Checks the defaults: HA for notifications, none for RPC queues.
    pub fn check_defaults(&self) -> anyhow::Result<()> {
        match self.notifications {
            Some(true) => {}
            Some(false) => bail!("Disabled HA notifications (should be enabled)"),
            None => bail!("HA notifications flag missing or contradictory"),
        }
        match self.rpc {
            Some(false) => {}
            Some(true) => bail!("Enabled HA RPC (should be disabled)"),
            None => bail!("HA RPC flag missing or contradictory"),
        }
        Ok(())
    }
}

fn parse_flag(lines: &[String], name: &str) -> Option<bool> {
    let enabled = format!("{}=true", name);
    let disabled = format!("{}=false", name);
    let contains = |pattern: &str| lines.iter().any(|line| line.contains(pattern));

    match (contains(&enabled), contains(&disabled)) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// Counts the non-empty lines in the output of
/// [`LIST_POLICIES_COMMAND`].
pub fn count_policies(lines: &[String]) -> usize {
    lines.iter().filter(|line| !line.is_empty()).count()
}

/// Fails unless at least one policy follows the header line of
/// [`LIST_POLICIES_COMMAND`].
pub fn check_policies(lines: &[String]) -> anyhow::Result<()> {
    let count = count_policies(lines);
    if count <= 1 {
        bail!("RabbitMQ lost its policies ({} non-empty lines listed)", count);
    }
    Ok(())
}

/// Verifies that rabbit runs with HiPE precompiled files.
pub fn verify_hipe_compilation<R: Remote + ?Sized>(remote: &mut R) -> Result<()> {
    // grep -c exits with 1 if no file matches
    let result = remote.execute(HIPE_FILES_COMMAND)?;
    if parse_grep_count(&result.stdout) == 0 {
        return Err(anyhow!(
            "RabbitMQ does not use HiPE or no precompiled files were found"
        )
        .into());
    }
    Ok(())
}

/// Async thread pool size which rabbit should be started with
///
/// 16 threads per CPU but at least 64.
pub fn expected_async_thread_pool_size(cpu_count: usize) -> usize {
    cpu_count.saturating_mul(16).max(MIN_ASYNC_THREAD_POOL_SIZE)
}

pub fn check_async_thread_pool_size(cpu_count: usize, actual: usize) -> anyhow::Result<()> {
    if actual < MIN_ASYNC_THREAD_POOL_SIZE {
        bail!(
            "Rabbit async thread pool size {} is smaller than {}",
            actual,
            MIN_ASYNC_THREAD_POOL_SIZE
        );
    }
    if actual > MAX_ASYNC_THREAD_POOL_SIZE {
        bail!(
            "Rabbit async thread pool size {} is bigger than {}",
            actual,
            MAX_ASYNC_THREAD_POOL_SIZE
        );
    }
    let expected = expected_async_thread_pool_size(cpu_count);
    if actual != expected {
        bail!(
            "Rabbit async thread pool size {} differs from the calculated size {} for {} CPUs",
            actual,
            expected,
            cpu_count
        );
    }
    Ok(())
}

/// Runs a command whose first output line is a number and returns it.
pub fn query_count<R: Remote + ?Sized>(remote: &mut R, command: &str) -> Result<usize> {
    let result = remote.check_call(command)?;
    let line = result
        .stdout
        .first()
        .ok_or_else(|| anyhow!("Command [{}] returned no output", command))?;
    let count = line
        .trim()
        .parse::<usize>()
        .with_context(|| format!("Output [{}] of [{}] is not a number", line, command))?;
    Ok(count)
}

/// Verifies the async thread pool size of the running rabbit node.
pub fn verify_async_thread_pool_size<R: Remote + ?Sized>(remote: &mut R) -> Result<()> {
    let cpu_count = query_count(remote, CPU_COUNT_COMMAND)?;
    let thread_pool_size = query_count(remote, ASYNC_THREAD_POOL_COMMAND)?;
    check_async_thread_pool_size(cpu_count, thread_pool_size)?;
    Ok(())
}

/// Action applied to the rabbitmq-server system service
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceAction {
    Start,
    Stop,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
        }
    }
}

/// Fails if the output of a service action mentions one of the
/// [`ERROR_WORDS`].
pub fn check_service_output(action: ServiceAction, result: &RemoteResult) -> anyhow::Result<()> {
    let combined = format!("{}{}", result.stdout_string(), result.stderr_string()).to_lowercase();
    if let Some(word) = ERROR_WORDS.iter().find(|word| combined.contains(*word)) {
        bail!(
            "Error word [{}] found in the output of service rabbitmq-server {}",
            word,
            action
        );
    }
    Ok(())
}

/// Starts or stops the rabbitmq-server service and checks its output.
pub fn control_service<R: Remote + ?Sized>(remote: &mut R, action: ServiceAction) -> Result<()> {
    let result = remote.check_call(&format!("service rabbitmq-server {}", action))?;
    check_service_output(action, &result)?;
    Ok(())
}

/// Observable state of the rabbitmq-server service
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceState {
    /// `Active: active (running)`
    Active,
    /// `Status: "Exited."`
    Exited,
    /// `rabbitmqctl status` prints diagnostics because the node is down
    Diagnostics,
}

impl ServiceState {
    /// Command which succeeds if the service is in this state
    pub fn command(&self) -> &'static str {
        match self {
            ServiceState::Active => {
                r#"service rabbitmq-server status 2>&1 | grep "Active: active (running)""#
            }
            ServiceState::Exited => {
                r#"service rabbitmq-server status 2>&1 | grep "Status: .Exited..""#
            }
            ServiceState::Diagnostics => "rabbitmqctl status 2>&1 | grep DIAGNOSTICS",
        }
    }

    /// Wait for this state with the usual timing of 1 minute and a poll
    /// every 20 seconds
    pub fn wait_spec(&self) -> WaitSpec {
        WaitSpec::new(format!("service rabbitmq-server {}", self))
            .with_timeout(Duration::from_secs(60))
            .with_interval(Duration::from_secs(20))
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Active => write!(f, "became active"),
            ServiceState::Exited => write!(f, "became exited"),
            ServiceState::Diagnostics => write!(f, "has DIAGNOSTICS info"),
        }
    }
}

/// Waits until the service reaches the given state.
pub fn wait_for_service_state<R: Remote + ?Sized>(
    remote: &mut R,
    state: ServiceState,
    spec: &WaitSpec,
) -> std::result::Result<(), WaitError> {
    spec.wait(|| remote.execute(state.command()))
}
