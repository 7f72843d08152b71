//! Meshboard Common Library
//!
//! Onboards network devices into a mesh overlay: each device is configured
//! through a vendor adapter, then registered with the mesh coordination
//! service under a hostname and tag set.

pub mod adapter;
pub mod config;
pub mod credentials;
pub mod descriptor;
pub mod error;
pub mod fleet;
pub mod inventory;
pub mod orchestrator;
pub mod outcome;
pub mod registrar;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use adapter::{AdapterSet, DeviceAdapter};
pub use config::MeshboardConfig;
pub use credentials::{Credential, CredentialResolver, EnvCredentialResolver, StaticCredentialResolver};
pub use descriptor::{CredentialReference, DeviceDescriptor};
pub use error::{
    ConfigError, CredentialError, Error, FailedPhase, OnboardingError, RegistrationError, Result,
    ValidationError,
};
pub use fleet::{FleetDriver, FleetReport, FleetSummary, RetryPolicy};
pub use inventory::Inventory;
pub use orchestrator::Orchestrator;
pub use outcome::{OnboardingOutcome, OutcomeResult, Phase};
pub use registrar::{HttpRegistrar, MeshRegistrar};
pub use types::*;

/// Meshboard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration directory
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".meshboard")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
