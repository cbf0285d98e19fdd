//! Settings of a test run
//!
//! Settings are loaded once by the test harness and handed to the
//! helpers which need them.
//!
//! ```yaml
//! public_test_ip: 8.8.8.8
//! ironic_nodes_config: /etc/mos-tests/ironic_nodes.yaml
//! wait:
//!   timeout_secs: 300
//!   interval_secs: 5
//! ```

use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable containing the path of the settings file
pub const CONFIG_ENV_VAR: &str = "MOS_TESTS_CONFIG";

/// Default timing of waits
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct WaitSettings {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        WaitSettings {
            timeout_secs: 60,
            interval_secs: 1,
        }
    }
}

impl WaitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Settings of a test run
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Public IP address which instances must be able to ping
    pub public_test_ip: IpAddr,
    /// YAML file describing the bare-metal nodes to enroll
    pub ironic_nodes_config: Option<PathBuf>,
    pub wait: WaitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            public_test_ip: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            ironic_nodes_config: None,
            wait: WaitSettings::default(),
        }
    }
}

impl Settings {
    /// Parses settings from the given YAML text.
    ///
    /// Missing keys take their default values; an empty document yields
    /// the default settings.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(yaml).map_err(|error| Error::Config(error.to_string()))
    }

    /// Reads settings from the given YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading settings from {}", path.display());
        let yaml = fs::read_to_string(path).map_err(|error| {
            Error::Config(format!(
                "Settings file [{}] could not be read: {}",
                path.display(),
                error
            ))
        })?;
        Settings::from_yaml(&yaml)
    }

    /// Reads settings from the file named in [`CONFIG_ENV_VAR`].
    ///
    /// The default settings are returned if the variable is not set.
    pub fn from_env() -> Result<Self> {
        match env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Settings::from_path(path),
            None => Ok(Settings::default()),
        }
    }
}
