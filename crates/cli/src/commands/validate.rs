//! Offline inventory validation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use meshboard_common::inventory::InventoryProblem;
use meshboard_common::Inventory;
use serde::Serialize;

use crate::output::{print_error, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ValidateArgs {
    /// Inventory file with [[device]] tables
    pub inventory: PathBuf,
}

/// One validated inventory entry
#[derive(Serialize)]
pub struct EntryView {
    pub device: String,
    pub kind: String,
    pub hostname: String,
    pub tags: Vec<String>,
    pub valid: bool,
    pub problems: Vec<String>,
}

impl TableDisplay for EntryView {
    fn headers() -> Vec<&'static str> {
        vec!["Device", "Kind", "Hostname", "Tags", "Valid", "Problems"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.device.clone(),
            self.kind.clone(),
            self.hostname.clone(),
            self.tags.join(", "),
            if self.valid { "yes".into() } else { "no".into() },
            self.problems.join("; "),
        ]
    }
}

/// Build one view per inventory entry, attaching its problems
pub fn entries(inventory: &Inventory, problems: &[InventoryProblem]) -> Vec<EntryView> {
    inventory
        .devices
        .iter()
        .enumerate()
        .map(|(index, device)| {
            let problems: Vec<String> = problems
                .iter()
                .filter(|p| p.index == index)
                .map(|p| p.message.clone())
                .collect();
            EntryView {
                device: device.device_id().to_string(),
                kind: device.kind.to_string(),
                hostname: device.hostname.clone(),
                tags: device.effective_tags(),
                valid: problems.is_empty(),
                problems,
            }
        })
        .collect()
}

pub fn execute(args: ValidateArgs, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(&args.inventory)
        .with_context(|| format!("reading inventory {}", args.inventory.display()))?;
    let inventory = Inventory::parse(&content)
        .with_context(|| format!("parsing inventory {}", args.inventory.display()))?;

    let problems = inventory.problems();
    let views = entries(&inventory, &problems);
    print_list(&views, format)?;

    if inventory.is_empty() {
        print_error("inventory has no [[device]] entries");
        std::process::exit(1);
    }
    if !problems.is_empty() {
        if !format.is_structured() {
            print_error(&format!("{} problem(s) in {}", problems.len(), args.inventory.display()));
        }
        std::process::exit(1);
    }
    if !format.is_structured() {
        print_success(&format!("{} devices valid", inventory.len()));
    }
    Ok(())
}
