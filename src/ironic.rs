//! Bare-metal node configuration for the Ironic tests
//!
//! The nodes to enroll are described in a YAML file:
//!
//! ```yaml
//! - driver: fuel_libvirt
//!   driver_info:
//!     libvirt_uri: null
//!   node_properties:
//!     cpus: 1
//!     memory_mb: 3072
//!     local_gb: 50
//! ```
//!
//! Virtual nodes use the `fuel_libvirt` driver. Their libvirt socket is
//! reached through a proxy on the host, so a missing `libvirt_uri` is
//! filled in with the address of that proxy.

use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Driver of virtual bare-metal nodes
pub const LIBVIRT_DRIVER: &str = "fuel_libvirt";

/// Hardware of a bare-metal node
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeProperties {
    pub cpus: u32,
    pub memory_mb: u64,
    pub local_gb: u64,
}

/// A bare-metal node to enroll
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IronicNodeConfig {
    pub driver: String,
    #[serde(default)]
    pub driver_info: BTreeMap<String, Value>,
    pub node_properties: NodeProperties,
    /// Known for physical nodes; assigned when a virtual node is created
    #[serde(default)]
    pub mac_address: Option<String>,
}

impl IronicNodeConfig {
    pub fn is_libvirt(&self) -> bool {
        self.driver == LIBVIRT_DRIVER
    }

    /// Returns the libvirt URI from the driver info if it is set.
    pub fn libvirt_uri(&self) -> Option<&str> {
        self.driver_info.get("libvirt_uri").and_then(Value::as_str)
    }
}

/// URI of the libvirt proxy listening on the given address
pub fn libvirt_uri(libvirt_proxy_ip: IpAddr) -> String {
    format!("qemu+tcp://{}/system", libvirt_proxy_ip)
}

/// Parses the node configuration and points unconfigured libvirt nodes
/// to the proxy.
pub fn load_nodes(yaml: &str, libvirt_proxy_ip: IpAddr) -> Result<Vec<IronicNodeConfig>> {
    let mut nodes: Vec<IronicNodeConfig> = serde_yaml::from_str(yaml)
        .map_err(|error| Error::Config(format!("Invalid Ironic node configuration: {}", error)))?;

    for node in nodes.iter_mut().filter(|node| node.is_libvirt()) {
        let uri = node
            .driver_info
            .entry(String::from("libvirt_uri"))
            .or_insert(Value::Null);
        if uri.is_null() {
            *uri = Value::String(libvirt_uri(libvirt_proxy_ip));
        }
    }

    debug!("{} Ironic nodes configured", nodes.len());
    Ok(nodes)
}

/// Reads the node configuration from a file, see [`load_nodes`].
pub fn load_nodes_from_path(
    path: impl AsRef<Path>,
    libvirt_proxy_ip: IpAddr,
) -> Result<Vec<IronicNodeConfig>> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|error| {
        Error::Config(format!(
            "Ironic node configuration [{}] could not be read: {}",
            path.display(),
            error
        ))
    })?;
    load_nodes(&yaml, libvirt_proxy_ip)
}

/// Flavor matching the hardware of a bare-metal node
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FlavorSpec {
    pub name: String,
    pub ram: u64,
    pub vcpus: u32,
    pub disk: u64,
}

impl FlavorSpec {
    /// Creates the flavor `baremetal_<index>` for the given node.
    pub fn for_node(index: usize, node: &IronicNodeConfig) -> Self {
        let properties = &node.node_properties;
        FlavorSpec {
            name: format!("baremetal_{}", index),
            ram: properties.memory_mb,
            vcpus: properties.cpus,
            disk: properties.local_gb,
        }
    }
}
