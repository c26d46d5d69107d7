//! Ledger commands.

use crate::output::{self, OutputFormat};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ledger_sync::{Category, DeleteOutcome, EntryDraft, EntryPatch, Ledger};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::info;
use tracker_core::TrackerRuntime;

/// The ledger as loaded by startup, reloaded if that load failed.
async fn loaded_ledger(runtime: &TrackerRuntime) -> Result<Ledger> {
    if !runtime.session().status.has_credentials() {
        bail!("Not logged in. Run 'expense-tracker login' first.");
    }
    let ledger = runtime.ledger();
    if ledger.last_error.is_some() {
        return Ok(runtime.load_ledger().await?);
    }
    Ok(ledger)
}

/// List entries, newest first.
pub async fn list(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    let ledger = loaded_ledger(runtime).await?;
    match format {
        OutputFormat::Text => {
            if ledger.entries.is_empty() {
                println!("No entries.");
                return Ok(());
            }
            output::print_heading(&format!("{} entries", ledger.entries.len()));
            for entry in &ledger.entries {
                output::print_entry(entry);
            }
            output::print_divider();
            output::print_row("Total", &ledger.total.to_string());
        }
        OutputFormat::Json => output::print_json(&ledger),
    }
    Ok(())
}

/// Add an entry.
pub async fn add(
    runtime: &TrackerRuntime,
    amount: Decimal,
    description: String,
    category: Category,
    date: Option<DateTime<Utc>>,
    format: &OutputFormat,
) -> Result<()> {
    let mut draft = EntryDraft::new(amount, description, category);
    draft.created_at = date;

    let entry = runtime.create_entry(draft).await?;
    info!(id = %entry.id, "Entry added");
    match format {
        OutputFormat::Text => {
            println!("Added:");
            output::print_entry(&entry);
            output::print_row("Total", &runtime.total().to_string());
        }
        OutputFormat::Json => output::print_json(&entry),
    }
    Ok(())
}

/// Change the given fields of an entry.
pub async fn edit(
    runtime: &TrackerRuntime,
    id: &str,
    amount: Option<Decimal>,
    description: Option<String>,
    category: Option<Category>,
    format: &OutputFormat,
) -> Result<()> {
    let patch = EntryPatch {
        amount,
        description,
        category,
    };
    let entry = runtime.update_entry(id, patch).await?;
    match format {
        OutputFormat::Text => {
            println!("Updated:");
            output::print_entry(&entry);
        }
        OutputFormat::Json => output::print_json(&entry),
    }
    Ok(())
}

/// Delete an entry.
pub async fn delete(runtime: &TrackerRuntime, id: &str, format: &OutputFormat) -> Result<()> {
    match runtime.delete_entry(id).await? {
        DeleteOutcome::Deleted => output::print_success(&format!("Deleted {}.", id), format),
        DeleteOutcome::NoOp => output::print_success(&format!("No entry {}.", id), format),
        DeleteOutcome::LocalOnly { error } => bail!(
            "Removed {} locally, but the remote delete failed ({}). Reload to check.",
            id,
            error
        ),
    }
    Ok(())
}

/// Print the sum of all entries.
pub async fn total(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    let ledger = loaded_ledger(runtime).await?;
    match format {
        OutputFormat::Text => println!("{}", ledger.total),
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "total": ledger.total,
            "entries": ledger.entries.len(),
        })),
    }
    Ok(())
}

/// Export entries as CSV to stdout or a file.
pub async fn export(
    runtime: &TrackerRuntime,
    path: Option<PathBuf>,
    format: &OutputFormat,
) -> Result<()> {
    loaded_ledger(runtime).await?;
    let csv = runtime.export_csv();
    match path {
        Some(path) => {
            std::fs::write(&path, csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output::print_success(&format!("Exported to {}.", path.display()), format);
        }
        None => print!("{}", csv),
    }
    Ok(())
}

/// Follow remote changes until Ctrl-C.
pub async fn watch(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    loaded_ledger(runtime).await?;
    let mut ledger_rx = runtime.subscribe_ledger();
    runtime.start_live()?;

    let every = runtime.settings().live_refresh;
    if !format.is_json() {
        println!(
            "Watching the ledger (refresh every {}s). Press Ctrl-C to stop.",
            every.as_secs()
        );
    }

    let mut last_total = None;
    loop {
        let ledger = ledger_rx.borrow_and_update().clone();
        if last_total != Some(ledger.total) {
            last_total = Some(ledger.total);
            match format {
                OutputFormat::Text => println!(
                    "{}  {} entries, total {}",
                    Utc::now().format("%H:%M:%S"),
                    ledger.entries.len(),
                    ledger.total
                ),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "total": ledger.total, "entries": ledger.entries.len() })
                ),
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = ledger_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if !runtime.is_live() {
            bail!("Live reload stopped; the session is no longer valid.");
        }
    }
    runtime.stop_live();
    Ok(())
}
