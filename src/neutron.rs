//! Names and commands for the network tests
//!
//! Instances are reached from the node hosting the DHCP agent of their
//! network: the agent's namespace has a leg in the instance network,
//! so `ip netns exec` makes the instance reachable without a floating
//! IP.

use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error as SuiteError, Result, WaitError};
use crate::remote::{wait_for_success, Remote, RemoteResult};
use crate::wait::WaitSpec;

/// Location of the instance key on the node hosting the DHCP agent
pub const VM_KEY_PATH: &str = "/tmp/instancekey_rsa";

/// Login of the CirrOS test images
pub const DEFAULT_VM_LOGIN: &str = "cirros";

/// Internal network with a single subnet
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InternalNetwork {
    pub network_name: String,
    pub subnet_name: String,
    pub cidr: String,
}

impl InternalNetwork {
    /// Names the network `netNN` and defaults the CIDR to
    /// `192.168.N.0/24`.
    pub fn new(suffix: u8, cidr: Option<&str>) -> Self {
        let network_name = format!("net{:02}", suffix);
        InternalNetwork {
            subnet_name: format!("{}__subnet", network_name),
            network_name,
            cidr: cidr
                .map(String::from)
                .unwrap_or_else(|| format!("192.168.{}.0/24", suffix)),
        }
    }
}

pub fn router_name(suffix: u8) -> String {
    format!("router{:02}", suffix)
}

/// Network namespace of the DHCP agent serving the network
pub fn dhcp_namespace(network_id: &str) -> String {
    format!("qdhcp-{}", network_id)
}

/// Command which pings all addresses once and fails if one of them is
/// unreachable
pub fn ping_command<S: AsRef<str>>(addresses: &[S]) -> String {
    addresses
        .iter()
        .map(|address| format!("ping -c1 {}", address.as_ref()))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Command which runs `command` on an instance via SSH from the DHCP
/// namespace of its network
///
/// The command is run on the node hosting the DHCP agent.
pub fn vm_ssh_command(
    namespace: &str,
    key_path: &str,
    login: &str,
    vm_ip: &str,
    command: &str,
) -> String {
    format!(
        ". openrc; ip netns exec {namespace} ssh -i {key_path} \
        -o 'StrictHostKeyChecking no' {login}@{vm_ip} \"{command}\"",
        namespace = namespace,
        key_path = key_path,
        login = login,
        vm_ip = vm_ip,
        command = command.replace('"', r#"\""#),
    )
}

/// Appends a UUID to the given prefix, so that resources of concurrent
/// or aborted test runs do not clash.
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// An instance reached via SSH from a DHCP namespace
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmAccess {
    pub namespace: String,
    pub vm_ip: String,
    pub login: String,
}

impl VmAccess {
    /// Reaches the instance from the DHCP namespace of the given network
    /// with the CirrOS login.
    pub fn new(network_id: &str, vm_ip: &str) -> Self {
        VmAccess {
            namespace: dhcp_namespace(network_id),
            vm_ip: vm_ip.to_owned(),
            login: String::from(DEFAULT_VM_LOGIN),
        }
    }

    pub fn with_login(mut self, login: &str) -> Self {
        self.login = login.to_owned();
        self
    }

    /// SSH command which runs `command` on the instance
    pub fn ssh_command(&self, command: &str) -> String {
        vm_ssh_command(
            &self.namespace,
            VM_KEY_PATH,
            &self.login,
            &self.vm_ip,
            command,
        )
    }

    /// Wait for a command on the instance with the usual timing of
    /// 3 minutes and a retry every 5 seconds
    pub fn wait_spec(&self, command: &str) -> WaitSpec {
        WaitSpec::new(format!(
            "command [{}] on {} to complete with exit code 0",
            command, self.vm_ip
        ))
        .with_timeout(Duration::from_secs(3 * 60))
        .with_interval(Duration::from_secs(5))
    }
}

/// Runs `command` on the instance and returns the first successful
/// result.
///
/// `remote` is a session on the node hosting the DHCP agent. The
/// namespace must exist there; the private key of the instance is
/// installed at [`VM_KEY_PATH`] before the command is retried until it
/// succeeds.
pub fn run_on_vm<R: Remote + ?Sized>(
    remote: &mut R,
    vm: &VmAccess,
    private_key: &str,
    command: &str,
    spec: &WaitSpec,
) -> Result<RemoteResult> {
    let namespace_check = format!("ip netns list | grep -q {}", vm.namespace);
    if !remote.execute(&namespace_check)?.is_ok() {
        return Err(SuiteError::Fatal(anyhow!(
            "Network namespace [{}] does not exist on the node",
            vm.namespace
        )));
    }

    remote.check_call(&format!(
        "echo \"{key}\" > {path} && chmod 400 {path}",
        key = private_key,
        path = VM_KEY_PATH
    ))?;

    info!("Executing [{}] on {}", command, vm.vm_ip);
    let result = wait_for_success(remote, &vm.ssh_command(command), spec)?;
    Ok(result)
}

/// Wait for an instance to answer pings with the usual timing of
/// 30 seconds and a ping every 10 seconds
pub fn vm_ping_spec(vm_ip: &str) -> WaitSpec {
    WaitSpec::new(format!("instance with IP {} to answer pings", vm_ip))
        .with_timeout(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10))
}

/// Failure to establish an SSH session
///
/// Connectors return it for failures which may go away while the
/// instance boots, so that waits can tolerate them.
#[derive(Debug, Error)]
pub enum SshError {
    #[error("SSH connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("No valid connections to {0}")]
    NoValidConnections(String),
}

/// Wait for SSH access to an instance with the usual timing of
/// 60 seconds and an attempt every 10 seconds
///
/// [`SshError`]s are tolerated.
pub fn vm_ssh_spec(vm_ip: &str) -> WaitSpec {
    WaitSpec::new(format!("instance with IP {} to be accessible with SSH", vm_ip))
        .with_timeout(Duration::from_secs(60))
        .with_interval(Duration::from_secs(10))
        .tolerate::<SshError>()
}

/// Waits until a session to the instance can be opened and runs `date`
/// in it.
///
/// `connect` opens the session.
pub fn check_vm_is_accessible_with_ssh<C, V>(
    mut connect: C,
    spec: &WaitSpec,
) -> std::result::Result<(), WaitError>
where
    C: FnMut() -> anyhow::Result<V>,
    V: Remote,
{
    spec.wait(|| -> anyhow::Result<bool> {
        let mut session = connect()?;
        session.execute("date")?;
        Ok(true)
    })
}

/// Waits until the instance answers pings from `node` and then until
/// it is accessible with SSH.
pub fn check_vm_is_available<R, C, V>(
    node: &mut R,
    vm_ip: &str,
    connect: C,
    ping_spec: &WaitSpec,
    ssh_spec: &WaitSpec,
) -> Result<()>
where
    R: Remote + ?Sized,
    C: FnMut() -> anyhow::Result<V>,
    V: Remote,
{
    wait_for_success(node, &ping_command(&[vm_ip]), ping_spec)?;
    check_vm_is_accessible_with_ssh(connect, ssh_spec)?;
    Ok(())
}
