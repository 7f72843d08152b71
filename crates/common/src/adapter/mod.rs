//! Device adapters
//!
//! One adapter per vendor family, all behind [`DeviceAdapter`]. An adapter
//! only configures the device; it never talks to the mesh service.
//!
//! Every adapter:
//! - scopes its session to a single `configure` call
//! - treats "already in the desired state" as success
//! - reports failures as [`ConfigError`] carrying the device target

pub mod cisco;
pub mod paloalto;
pub mod pfsense;
pub mod ssh;

use crate::config::MeshboardConfig;
use crate::credentials::Credential;
use crate::descriptor::DeviceDescriptor;
use crate::error::ConfigError;
use crate::types::DeviceKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use cisco::CiscoSwitchAdapter;
pub use paloalto::PaloAltoAdapter;
pub use pfsense::PfSenseAdapter;
pub use ssh::{CommandOutput, ShellSession, ShellTransport, Ssh2Transport};

/// Applies mesh-enabling configuration to one device
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Device family this adapter handles
    fn kind(&self) -> DeviceKind;

    /// Tag identifying the device class in the mesh
    fn default_tag(&self) -> &'static str {
        self.kind().default_tag()
    }

    /// Configure the device. Re-running against a configured device succeeds.
    async fn configure(
        &self,
        descriptor: &DeviceDescriptor,
        credential: &Credential,
    ) -> Result<(), ConfigError>;
}

/// Adapters keyed by the device kind they handle
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<DeviceKind, Arc<dyn DeviceAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Production adapters for every supported vendor
    pub fn from_config(config: &MeshboardConfig) -> Self {
        Self::new()
            .with(CiscoSwitchAdapter::new(
                Arc::new(Ssh2Transport::new(
                    config.cisco.port,
                    Duration::from_secs(config.cisco.timeout_secs),
                )),
                config.cisco.commands.clone(),
            ))
            .with(PaloAltoAdapter::new(config.paloalto.clone()))
            .with(PfSenseAdapter::new(config.pfsense.clone()))
    }

    /// Register an adapter, replacing any adapter for the same kind
    pub fn with(mut self, adapter: impl DeviceAdapter + 'static) -> Self {
        self.insert(Arc::new(adapter));
        self
    }

    pub fn insert(&mut self, adapter: Arc<dyn DeviceAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: DeviceKind) -> Option<Arc<dyn DeviceAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<DeviceKind> {
        let mut kinds: Vec<DeviceKind> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet").field("kinds", &self.kinds()).finish()
    }
}

/// HTTP client for one configure call. Dropped (and its connections closed)
/// when the call returns.
pub(crate) fn http_client(timeout: Duration, accept_invalid_certs: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
}

/// Base URL for a firewall target given as bare host or full URL
pub(crate) fn base_url(target: &str) -> String {
    let trimmed = target.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Keep diagnostic bodies readable in logs and reports
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    let body = body.trim();
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}
