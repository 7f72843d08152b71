//! Meshboard CLI - Main Entry Point
//!
//! Configures switches and firewalls for the mesh overlay and registers them
//! with the coordination service, one device at a time or a whole inventory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use meshboard_cli::commands::{config, devices, fleet, onboard, validate};
use meshboard_cli::context::AppContext;
use meshboard_cli::output::{self, print_error};
use meshboard_common::MeshboardConfig;

/// Meshboard - mesh onboarding for network devices
#[derive(Parser)]
#[command(name = "meshboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (default ~/.meshboard/config.toml)
    #[arg(long, env = "MESHBOARD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure and register a single device
    Onboard(onboard::OnboardArgs),

    /// Onboard every device in an inventory file
    Fleet(fleet::FleetArgs),

    /// Check an inventory file without contacting anything
    Validate(validate::ValidateArgs),

    /// List devices registered in the mesh
    Devices(devices::DevicesArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Commands::Onboard(args) => {
            let ctx = AppContext::load(cli.config)?;
            onboard::execute(args, &ctx, format).await?
        }
        Commands::Fleet(args) => {
            let ctx = AppContext::load(cli.config)?;
            fleet::execute(args, &ctx, format).await?
        }
        Commands::Validate(args) => validate::execute(args, format)?,
        Commands::Devices(args) => {
            let ctx = AppContext::load(cli.config)?;
            devices::execute(args, &ctx, format).await?
        }
        Commands::Config(cmd) => {
            let path = cli.config.unwrap_or_else(MeshboardConfig::default_path);
            config::execute(cmd, &path, format)?
        }
        Commands::Version => {
            println!("Meshboard CLI v{}", meshboard_common::VERSION);
            println!("Supported devices: cisco-switch, paloalto-firewall, pfsense-firewall");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(2);
    }
}
