//! Wiring from configuration to the onboarding machinery

use anyhow::{Context, Result};
use meshboard_common::{
    AdapterSet, CredentialReference, EnvCredentialResolver, HttpRegistrar, MeshboardConfig, Orchestrator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Loaded configuration plus the resolvers built from it
pub struct AppContext {
    pub config: MeshboardConfig,
    pub config_path: PathBuf,
    credentials: Arc<EnvCredentialResolver>,
}

impl AppContext {
    /// Load config from `path`, or the default location
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(MeshboardConfig::default_path);
        let config = MeshboardConfig::load(&config_path)
            .with_context(|| format!("loading configuration from {}", config_path.display()))?;
        debug!("Using configuration {}", config_path.display());

        Ok(Self {
            config,
            config_path,
            credentials: Arc::new(EnvCredentialResolver::new()),
        })
    }

    /// Registrar for the configured mesh service
    pub fn registrar(&self) -> Result<HttpRegistrar> {
        let reference = CredentialReference::new(self.config.registrar.api_key_credential.clone());
        HttpRegistrar::from_config(&self.config.registrar, self.credentials.as_ref()).with_context(|| {
            format!(
                "mesh service API key: set {}_API_KEY",
                self.credentials.variable_stem(&reference)
            )
        })
    }

    /// Orchestrator using the production adapters
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let registrar = self.registrar()?;
        Ok(Orchestrator::new(
            AdapterSet::from_config(&self.config),
            Arc::new(registrar),
            self.credentials.clone(),
        ))
    }
}
