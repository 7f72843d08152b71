//! Single-device onboarding

use anyhow::Result;
use clap::Args;
use meshboard_common::{DeviceDescriptor, DeviceKind, OnboardingOutcome};

use crate::context::AppContext;
use crate::output::{print_error, print_item, print_success, print_warning, OutputFormat};

#[derive(Args)]
pub struct OnboardArgs {
    /// Device family (cisco-switch, paloalto-firewall, pfsense-firewall)
    #[arg(long)]
    pub kind: DeviceKind,

    /// Management address or API base URL
    #[arg(long)]
    pub target: String,

    /// Hostname to register in the mesh
    #[arg(long)]
    pub hostname: String,

    /// Credential reference resolved from MESHBOARD_CRED_<REF>_* variables
    #[arg(long)]
    pub credential: String,

    /// Extra mesh tag, repeatable (tag:<name>)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Display name used in reports
    #[arg(long)]
    pub name: Option<String>,

    /// Skip configuration and only register; for devices an earlier run
    /// already configured
    #[arg(long)]
    pub resume: bool,
}

impl OnboardArgs {
    fn descriptor(&self) -> DeviceDescriptor {
        let descriptor = DeviceDescriptor::new(self.kind, &self.target, &self.credential, &self.hostname)
            .with_tags(self.tags.clone());
        match &self.name {
            Some(name) => descriptor.with_name(name),
            None => descriptor,
        }
    }
}

pub async fn execute(args: OnboardArgs, ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let descriptor = args.descriptor();
    let orchestrator = ctx.orchestrator()?;

    let outcome = if args.resume {
        orchestrator.resume_registration(&descriptor).await
    } else {
        orchestrator.onboard(&descriptor).await
    };

    report(&outcome, format)?;
    if !outcome.is_registered() {
        std::process::exit(1);
    }
    Ok(())
}

fn report(outcome: &OnboardingOutcome, format: OutputFormat) -> Result<()> {
    if format.is_structured() {
        return print_item(outcome, format);
    }

    print_item(outcome, format)?;
    if outcome.is_registered() {
        print_success(&outcome.summary());
    } else {
        print_error(&outcome.summary());
        if outcome.configured_but_unregistered() {
            print_warning("device configuration was left in place; rerun with --resume to register it");
        }
    }
    Ok(())
}
