//! Device inventory files
//!
//! An inventory is a TOML file of `[[device]]` tables:
//!
//! ```toml
//! [[device]]
//! name = "core-switch"
//! kind = "cisco-switch"
//! target = "10.0.0.5"
//! credential = "cisco-lab"
//! hostname = "sw-01"
//! tags = ["tag:site-a"]
//! ```

use crate::descriptor::DeviceDescriptor;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Devices to onboard, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceDescriptor>,
}

/// Something wrong with one inventory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryProblem {
    /// Zero-based position in the file
    pub index: usize,
    pub device: String,
    pub message: String,
}

impl std::fmt::Display for InventoryProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device #{} ({}): {}", self.index + 1, self.device, self.message)
    }
}

impl Inventory {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self { devices }
    }

    /// Parse an inventory without validating its entries
    pub fn parse(content: &str) -> Result<Self> {
        let inventory: Inventory = toml::from_str(content)?;
        Ok(inventory)
    }

    /// Read and parse an inventory file, keeping entries that fail
    /// validation. Onboarding reports those per device instead.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let inventory = Self::parse(&content)?;
        debug!("Read {} devices from {}", inventory.devices.len(), path.display());
        Ok(inventory)
    }

    /// Read, parse and validate an inventory file
    pub fn load(path: &Path) -> Result<Self> {
        let inventory = Self::read(path)?;
        inventory.validate()?;
        Ok(inventory)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Every problem in the inventory: invalid descriptors and hostnames
    /// requested more than once (compared case-insensitively)
    pub fn problems(&self) -> Vec<InventoryProblem> {
        let mut problems = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, device) in self.devices.iter().enumerate() {
            if let Err(e) = device.validate() {
                problems.push(InventoryProblem {
                    index,
                    device: device.device_id().to_string(),
                    message: e.to_string(),
                });
            }

            if device.hostname.is_empty() {
                continue;
            }
            if let Some(first) = seen.get(&device.hostname.to_ascii_lowercase()) {
                problems.push(InventoryProblem {
                    index,
                    device: device.device_id().to_string(),
                    message: format!(
                        "hostname '{}' is already used by device #{}",
                        device.hostname,
                        first + 1
                    ),
                });
            } else {
                seen.insert(device.hostname.to_ascii_lowercase(), index);
            }
        }
        problems
    }

    /// Fail on the first problem set, listing all of them
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(Error::InvalidInventory("no [[device]] entries".into()));
        }
        let problems = self.problems();
        if problems.is_empty() {
            return Ok(());
        }
        let listed: Vec<String> = problems.iter().map(ToString::to_string).collect();
        Err(Error::InvalidInventory(listed.join("; ")))
    }
}
