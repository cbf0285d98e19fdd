mod util;

use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};

use anyhow::Result;
use indoc::indoc;
use mos_integration_tests::ironic::*;
use mos_integration_tests::Error;
use spectral::prelude::*;
use util::assertions::ExtendedVecAssertions;

const PROXY_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 109, 0, 2));

const NODES: &str = indoc! {"
    - driver: fuel_libvirt
      driver_info:
        libvirt_uri: null
      node_properties:
        cpus: 1
        memory_mb: 3072
        local_gb: 50
    - driver: fuel_libvirt
      node_properties:
        cpus: 2
        memory_mb: 4096
        local_gb: 100
    - driver: fuel_libvirt
      driver_info:
        libvirt_uri: qemu+tcp://192.168.0.1/system
      node_properties:
        cpus: 1
        memory_mb: 2048
        local_gb: 20
    - driver: fuel_ipmitool
      driver_info:
        ipmi_address: 172.16.40.5
        ipmi_username: admin
      node_properties:
        cpus: 8
        memory_mb: 16384
        local_gb: 500
      mac_address: 52:54:00:1c:be:02
"};

#[test]
fn libvirt_nodes_should_point_to_the_proxy() -> Result<()> {
    let nodes = load_nodes(NODES, PROXY_IP)?;

    assert_that(&nodes).has_length(4);
    assert_that(&nodes[0].libvirt_uri()).is_equal_to(Some("qemu+tcp://10.109.0.2/system"));
    assert_that(&nodes[1].libvirt_uri()).is_equal_to(Some("qemu+tcp://10.109.0.2/system"));
    Ok(())
}

#[test]
fn configured_libvirt_uri_should_be_kept() -> Result<()> {
    let nodes = load_nodes(NODES, PROXY_IP)?;

    assert_that(&nodes[2].libvirt_uri()).is_equal_to(Some("qemu+tcp://192.168.0.1/system"));
    Ok(())
}

#[test]
fn physical_nodes_should_be_left_untouched() -> Result<()> {
    let nodes = load_nodes(NODES, PROXY_IP)?;
    let node = &nodes[3];

    assert_that(&node.is_libvirt()).is_false();
    assert_that(&node.libvirt_uri()).is_none();
    assert_that(&node.driver_info.len()).is_equal_to(2);
    assert_that(&node.mac_address).is_equal_to(Some(String::from("52:54:00:1c:be:02")));
    Ok(())
}

#[test]
fn flavors_should_match_the_node_hardware() -> Result<()> {
    let nodes = load_nodes(NODES, PROXY_IP)?;

    let flavors: Vec<FlavorSpec> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| FlavorSpec::for_node(index, node))
        .collect();

    assert_that(&flavors).is_not_empty();
    assert_that(&flavors[3]).is_equal_to(FlavorSpec {
        name: String::from("baremetal_3"),
        ram: 16384,
        vcpus: 8,
        disk: 500,
    });
    Ok(())
}

#[test]
fn missing_node_properties_should_be_a_config_error() {
    let yaml = indoc! {"
        - driver: fuel_libvirt
          driver_info: {}
    "};

    let result = load_nodes(yaml, PROXY_IP);

    assert_that(&matches!(result, Err(Error::Config(_)))).is_true();
}

#[test]
fn nodes_should_be_loaded_from_a_file() -> Result<()> {
    let path = env::temp_dir().join(format!("ironic-nodes-{}.yaml", std::process::id()));
    fs::write(&path, NODES)?;

    let result = load_nodes_from_path(&path, PROXY_IP);
    fs::remove_file(&path)?;

    assert_that(&result?).has_length(4);
    Ok(())
}

#[test]
fn missing_file_should_be_a_config_error() {
    let result = load_nodes_from_path("/nonexistent/ironic_nodes.yaml", PROXY_IP);

    match result {
        Err(Error::Config(message)) => {
            assert_that(&message).contains("/nonexistent/ironic_nodes.yaml")
        }
        other => panic!("config error expected but got {:?}", other),
    }
}
