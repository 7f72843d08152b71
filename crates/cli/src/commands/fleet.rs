//! Inventory-wide onboarding

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use meshboard_common::{FleetDriver, FleetReport, FleetSummary, Inventory, RetryPolicy};
use serde::Serialize;

use crate::context::AppContext;
use crate::output::{print_list, print_structured, print_warning, OutputFormat};

#[derive(Args)]
pub struct FleetArgs {
    /// Inventory file with [[device]] tables
    pub inventory: PathBuf,

    /// Devices onboarded at once (default from config)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Extra attempts for retryable failures (default from config)
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Serialize)]
struct ReportView<'a> {
    summary: FleetSummary,
    #[serde(flatten)]
    report: &'a FleetReport,
}

pub async fn execute(args: FleetArgs, ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let inventory = read_inventory(&args.inventory)?;

    let fleet = &ctx.config.fleet;
    let retry = RetryPolicy::new(args.retries.unwrap_or(fleet.max_retries), fleet.retry_backoff());
    let driver = FleetDriver::new(ctx.orchestrator()?)
        .with_concurrency(args.concurrency.unwrap_or(fleet.concurrency))
        .with_retry_policy(retry);

    let report = driver.run(&inventory.devices).await;

    if format.is_structured() {
        print_structured(
            &ReportView {
                summary: report.summary(),
                report: &report,
            },
            format,
        )?;
    } else {
        print_list(&report.outcomes, format)?;
        print_summary(&report);
    }

    if !report.all_registered() {
        std::process::exit(1);
    }
    Ok(())
}

/// Load the inventory for a run. Invalid entries stay in and come back as
/// failed outcomes; only an unreadable or empty file stops the run.
fn read_inventory(path: &Path) -> Result<Inventory> {
    let inventory =
        Inventory::read(path).with_context(|| format!("loading inventory {}", path.display()))?;
    if inventory.is_empty() {
        bail!("inventory {} has no [[device]] entries", path.display());
    }
    for problem in inventory.problems() {
        print_warning(&problem.to_string());
    }
    Ok(inventory)
}

fn print_summary(report: &FleetReport) {
    let summary = report.summary();
    let elapsed = report.finished_at - report.started_at;

    println!();
    println!("{}", "━".repeat(60).dimmed());
    println!(
        " {} of {} devices registered ({} new, {} already present) in {:.1}s",
        summary.registered.to_string().green().bold(),
        summary.total,
        summary.created,
        summary.already_registered,
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    if summary.failed > 0 {
        println!(
            " {} failed, {} retryable",
            summary.failed.to_string().red().bold(),
            summary.retryable
        );
    }
    println!("{}", "━".repeat(60).dimmed());

    for outcome in report.failed().filter(|o| o.configured_but_unregistered()) {
        print_warning(&format!(
            "{} is configured but not registered; `meshboard onboard --resume` registers it",
            outcome.device
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_entry_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(
            &path,
            r#"
[[device]]
kind = "cisco-switch"
target = "10.0.0.5"
credential = "cisco-lab"
hostname = "sw-01"

[[device]]
kind = "cisco-switch"
target = "10.0.0.6"
credential = "cisco-lab"
hostname = "sw_02"
"#,
        )
        .unwrap();

        let inventory = read_inventory(&path).unwrap();

        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.devices[1].hostname, "sw_02");
    }

    #[test]
    fn test_empty_inventory_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "").unwrap();

        assert!(read_inventory(&path).is_err());
    }
}
