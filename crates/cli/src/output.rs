//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use meshboard_common::{MeshDevice, OnboardingOutcome, Phase};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    /// JSON and YAML print the serialized value and nothing else
    pub fn is_structured(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Yaml)
    }
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_plain(headers: &[&str], row: &[String]) {
    for (header, value) in headers.iter().zip(row.iter()) {
        println!("{}: {}", header, value);
    }
}

/// Print any serializable value as JSON or YAML
pub fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(T::headers());
            table.add_row(item.row());
            println!("{table}");
        }
        OutputFormat::Json | OutputFormat::Yaml => print_structured(item, format)?,
        OutputFormat::Plain => print_plain(&T::headers(), &item.row()),
    }
    Ok(())
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> anyhow::Result<()> {
    if items.is_empty() && !format.is_structured() {
        println!("No items found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
        }
        OutputFormat::Json | OutputFormat::Yaml => print_structured(items, format)?,
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                print_plain(&T::headers(), &item.row());
            }
        }
    }
    Ok(())
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✔".green().bold(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✘".red().bold(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "!".yellow().bold(), message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("{} {}", "i".cyan().bold(), message);
}

/// Status cell for an outcome
pub fn outcome_status(outcome: &OnboardingOutcome) -> String {
    match (outcome.registration_status(), outcome.failed_phase()) {
        (Some(status), _) => format!("{} {}", "✔".green(), status),
        (None, Some(phase)) if outcome.phase_reached == Phase::Configured => {
            format!("{} {} (configured)", "✘".red(), phase)
        }
        (None, Some(phase)) => format!("{} {}", "✘".red(), phase),
        (None, None) => "-".to_string(),
    }
}

impl TableDisplay for OnboardingOutcome {
    fn headers() -> Vec<&'static str> {
        vec!["Device", "Kind", "Hostname", "Status", "Tags", "Attempts", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let detail = match (self.mesh_device(), self.error()) {
            (Some(device), _) => device.id.clone().unwrap_or_default(),
            (None, Some(error)) => error.to_string(),
            (None, None) => String::new(),
        };
        vec![
            self.device.clone(),
            self.kind.to_string(),
            self.hostname.clone(),
            outcome_status(self),
            self.tags.join(", "),
            self.attempts.to_string(),
            detail,
        ]
    }
}

impl TableDisplay for MeshDevice {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Hostname", "Tags", "Created"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone().unwrap_or_else(|| "-".into()),
            self.hostname.clone(),
            self.tags.join(", "),
            self.created.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]
    }
}
