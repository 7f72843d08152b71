//! Configuration file commands

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;
use meshboard_common::{CredentialReference, EnvCredentialResolver, MeshboardConfig};

use crate::context::AppContext;
use crate::output::{print_info, print_structured, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

pub fn execute(cmd: ConfigCommands, path: &Path, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => init(path, force),
        ConfigCommands::Show => {
            let ctx = AppContext::load(Some(path.to_path_buf()))?;
            show(&ctx.config, format)
        }
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = MeshboardConfig::default();
    config.save(path)?;
    print_success(&format!("Wrote default configuration to {}", path.display()));

    let reference = CredentialReference::new(config.registrar.api_key_credential.clone());
    print_info(&format!(
        "Set {}_API_KEY to the mesh service API key before onboarding",
        EnvCredentialResolver::new().variable_stem(&reference)
    ));
    Ok(())
}

fn show(config: &MeshboardConfig, format: OutputFormat) -> Result<()> {
    if format.is_structured() {
        return print_structured(config, format);
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
