//! Output formatting for the CLI.

use clap::ValueEnum;
use ledger_sync::LedgerEntry;
use serde::Serialize;
use tracker_config_and_utils::ErrorKind;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": "success",
            "message": message,
        })),
    }
}

/// Print an error message with its kind.
pub fn print_error(message: &str, kind: Option<ErrorKind>, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => {
            let body = serde_json::json!({
                "status": "error",
                "message": message,
                "error": kind,
            });
            eprintln!("{}", body);
        }
    }
}

/// Print a table row.
pub fn print_row(label: &str, value: &str) {
    println!("  {:<18} {}", format!("{}:", label), value);
}

/// Print a divider line.
pub fn print_divider() {
    println!("{}", "-".repeat(60));
}

/// Print a heading.
pub fn print_heading(text: &str) {
    println!("\n{}", text);
    print_divider();
}

/// One ledger line: date, category, amount, description, id.
pub fn print_entry(entry: &LedgerEntry) {
    println!(
        "  {}  {:<13} {:>12}  {}  [{}]",
        entry.created_at.format("%Y-%m-%d %H:%M"),
        entry.category.as_str(),
        entry.amount,
        entry.description,
        entry.id,
    );
}

/// Render an optional value, or a dash.
pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
