//! Live migration of instances
//!
//! Whether a migration mode is possible depends on the storage backend:
//! block migration copies the local disks and is pointless with
//! ephemeral Ceph volumes, while true live migration requires them.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result, WaitError};
use crate::wait::WaitSpec;

/// Status of an instance which finished migrating
pub const ACTIVE: &str = "ACTIVE";

/// The parts of a compute instance relevant for migrations
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Server {
    pub id: String,
    pub name: String,
    /// Compute host the instance runs on (`OS-EXT-SRV-ATTR:host`)
    pub host: String,
    pub status: String,
}

impl Server {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(ACTIVE)
    }
}

/// Access to the compute API
pub trait ComputeApi {
    /// Fetches the current state of the instance.
    fn server(&self, id: &str) -> anyhow::Result<Server>;
}

impl<A: ComputeApi + ?Sized> ComputeApi for &A {
    fn server(&self, id: &str) -> anyhow::Result<Server> {
        (**self).server(id)
    }
}

/// Expected outcome of a migration
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MigrationCheck {
    /// The instances run on the given host.
    To(String),
    /// The instances left the given host.
    AwayFrom(String),
}

impl MigrationCheck {
    pub fn is_satisfied_by(&self, host: &str) -> bool {
        match self {
            MigrationCheck::To(target) => host == target,
            MigrationCheck::AwayFrom(source) => host != source,
        }
    }
}

impl fmt::Display for MigrationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationCheck::To(host) => write!(f, "to {}", host),
            MigrationCheck::AwayFrom(host) => write!(f, "from {}", host),
        }
    }
}

/// Checks if all instances are active and satisfy the check.
pub fn is_migrated<A, S>(api: &A, ids: &[S], check: &MigrationCheck) -> anyhow::Result<bool>
where
    A: ComputeApi + ?Sized,
    S: AsRef<str>,
{
    for id in ids {
        let server = api.server(id.as_ref())?;
        if !server.is_active() || !check.is_satisfied_by(&server.host) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Wait for a migration with the usual timing of 20 minutes and a poll
/// every 5 seconds
pub fn migration_spec(check: &MigrationCheck) -> WaitSpec {
    WaitSpec::new(format!("instances to migrate {}", check))
        .with_timeout(Duration::from_secs(20 * 60))
        .with_interval(Duration::from_secs(5))
}

/// Waits until all instances are migrated.
pub fn wait_migrated<A, S>(
    api: &A,
    ids: &[S],
    check: &MigrationCheck,
    spec: &WaitSpec,
) -> std::result::Result<(), WaitError>
where
    A: ComputeApi + ?Sized,
    S: AsRef<str>,
{
    spec.wait(|| is_migrated(api, ids, check))
}

/// Kind of live migration
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MigrationKind {
    /// Local disks are copied to the target host.
    Block,
    /// Only memory is transferred; disks are on shared storage.
    True,
}

impl MigrationKind {
    pub fn is_block(&self) -> bool {
        *self == MigrationKind::Block
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationKind::Block => write!(f, "block LM"),
            MigrationKind::True => write!(f, "true LM"),
        }
    }
}

/// Reads the `ephemeral_ceph` flag from the cluster settings.
///
/// The flag is looked up at `*/storage/**/ephemeral_ceph/value`.
pub fn nova_ceph(settings: &Value) -> Result<bool> {
    let value = settings
        .as_object()
        .into_iter()
        .flat_map(|sections| sections.values())
        .filter_map(|section| section.get("storage"))
        .find_map(|storage| find_key(storage, "ephemeral_ceph"))
        .and_then(|setting| setting.get("value"))
        .ok_or_else(|| Error::Config(String::from("Setting ephemeral_ceph not found")))?;

    value
        .as_bool()
        .ok_or_else(|| Error::Config(format!("Setting ephemeral_ceph is not a boolean: {}", value)))
}

fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|child| find_key(child, key))),
        Value::Array(items) => items.iter().find_map(|child| find_key(child, key)),
        _ => None,
    }
}

/// Returns the requested migration kind or skips if the storage
/// backend does not support it.
pub fn block_migration_mode(nova_ceph: bool, requested: MigrationKind) -> Result<MigrationKind> {
    match (nova_ceph, requested) {
        (true, MigrationKind::Block) => Err(Error::skip(
            "Block migration requires Nova Ceph RBD to be disabled",
        )),
        (false, MigrationKind::True) => Err(Error::skip("True live migration requires Nova Ceph RBD")),
        (_, kind) => Ok(kind),
    }
}

/// Skips combinations of volume backed instances and migration kinds
/// which are not allowed without Ceph.
pub fn check_restrictions(nova_ceph: bool, volume_backed: bool, kind: MigrationKind) -> Result<()> {
    if !nova_ceph && volume_backed == kind.is_block() {
        Err(Error::skip(
            "Block migration is not allowed with volume backed instances",
        ))
    } else {
        Ok(())
    }
}
