//! Meshboard configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the mesh service base URL
pub const API_URL_ENV: &str = "MESHBOARD_API_URL";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshboardConfig {
    /// Mesh coordination service
    pub registrar: RegistrarConfig,

    /// Fleet runs
    pub fleet: FleetConfig,

    /// Cisco switch adapter
    pub cisco: CiscoConfig,

    /// Palo Alto firewall adapter
    pub paloalto: PaloAltoConfig,

    /// pfSense firewall adapter
    pub pfsense: PfSenseConfig,
}

/// Mesh coordination service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Base URL of the service API
    pub api_url: String,

    /// Credential reference holding the API key
    pub api_key_credential: String,

    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.tailscale.com/api/v2".to_string(),
            api_key_credential: "mesh-api".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Fleet driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Devices onboarded at the same time
    pub concurrency: usize,

    /// Extra attempts for retryable failures
    pub max_retries: u32,

    /// Pause between attempts
    pub retry_backoff_secs: u64,
}

impl FleetConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 0,
            retry_backoff_secs: 5,
        }
    }
}

/// Cisco switch (SSH command session) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CiscoConfig {
    /// SSH port
    pub port: u16,

    /// Connect and per-command timeout
    pub timeout_secs: u64,

    /// Commands issued in order
    pub commands: Vec<String>,
}

impl Default for CiscoConfig {
    fn default() -> Self {
        Self {
            port: 22,
            timeout_secs: 30,
            commands: [
                "configure terminal",
                "interface vlan1",
                "ip address dhcp",
                "exit",
                "ip http server",
                "exit",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Palo Alto firewall (XML API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaloAltoConfig {
    pub timeout_secs: u64,

    /// Accept self-signed management certificates
    pub accept_invalid_certs: bool,

    /// Device entry name in the config tree
    pub device_entry: String,

    /// Virtual router receiving the route
    pub virtual_router: String,

    /// Static route entry name
    pub route_name: String,

    /// Mesh address range routed through the firewall
    pub destination: String,

    pub nexthop: String,

    pub interface: String,

    pub metric: u32,
}

impl Default for PaloAltoConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            accept_invalid_certs: false,
            device_entry: "localhost.localdomain".to_string(),
            virtual_router: "default".to_string(),
            route_name: "Tailscale-Route".to_string(),
            destination: "100.64.0.0/10".to_string(),
            nexthop: "192.168.1.1".to_string(),
            interface: "ethernet1/1".to_string(),
            metric: 10,
        }
    }
}

/// pfSense firewall (REST package/service API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PfSenseConfig {
    pub timeout_secs: u64,

    /// Accept self-signed management certificates
    pub accept_invalid_certs: bool,

    /// Package installed on the firewall
    pub package: String,

    /// Service started after installation
    pub service: String,
}

impl Default for PfSenseConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            accept_invalid_certs: false,
            package: "tailscale".to_string(),
            service: "tailscale".to_string(),
        }
    }
}

impl MeshboardConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                self.registrar.api_url = url;
            }
        }
    }

    /// Reject settings that would make every run fail
    pub fn validate(&self) -> Result<()> {
        if self.registrar.api_url.trim().is_empty() {
            return Err(crate::Error::InvalidConfig("registrar.api_url is empty".into()));
        }
        if self.fleet.concurrency == 0 {
            return Err(crate::Error::InvalidConfig("fleet.concurrency must be at least 1".into()));
        }
        if self.cisco.commands.is_empty() {
            return Err(crate::Error::InvalidConfig("cisco.commands must not be empty".into()));
        }
        let timeouts = [
            ("registrar", self.registrar.timeout_secs),
            ("cisco", self.cisco.timeout_secs),
            ("paloalto", self.paloalto.timeout_secs),
            ("pfsense", self.pfsense.timeout_secs),
        ];
        for (section, secs) in timeouts {
            if secs == 0 {
                return Err(crate::Error::InvalidConfig(format!("{section}.timeout_secs must be at least 1")));
            }
        }
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        crate::default_config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MeshboardConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.fleet.concurrency, 4);
        assert_eq!(config.cisco.commands.len(), 6);
        assert_eq!(config.paloalto.destination, "100.64.0.0/10");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = MeshboardConfig::default();
        config.fleet.max_retries = 3;
        config.pfsense.accept_invalid_certs = true;
        config.save(&path).unwrap();

        let loaded = MeshboardConfig::load(&path).unwrap();
        assert_eq!(loaded.fleet.max_retries, 3);
        assert!(loaded.pfsense.accept_invalid_certs);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fleet]\nconcurrency = 8\n").unwrap();

        let config = MeshboardConfig::load(&path).unwrap();
        assert_eq!(config.fleet.concurrency, 8);
        assert_eq!(config.fleet.retry_backoff_secs, 5);
        assert_eq!(config.registrar.timeout_secs, 30);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = MeshboardConfig::default();
        config.fleet.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
