//! Mesh device listing

use anyhow::Result;
use clap::Args;
use meshboard_common::MeshRegistrar;

use crate::context::AppContext;
use crate::output::{print_error, print_item, print_list, OutputFormat};

#[derive(Args)]
pub struct DevicesArgs {
    /// Show only the device registered under this hostname
    #[arg(long)]
    pub hostname: Option<String>,
}

pub async fn execute(args: DevicesArgs, ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let registrar = ctx.registrar()?;

    match args.hostname {
        Some(hostname) => match registrar.lookup(&hostname).await? {
            Some(device) => print_item(&device, format)?,
            None => {
                print_error(&format!("{} is not registered in the mesh", hostname));
                std::process::exit(1);
            }
        },
        None => {
            let devices = registrar.list().await?;
            print_list(&devices, format)?;
        }
    }
    Ok(())
}
