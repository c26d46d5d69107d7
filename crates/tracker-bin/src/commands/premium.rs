//! Premium and theme commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_session::ThemeMode;
use tracker_core::TrackerRuntime;

/// Activate premium. Only allowed once the ledger total crossed the threshold.
pub fn activate_premium(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    runtime.activate_premium()?;
    output::print_success("Premium activated. Dark theme enabled.", format);
    Ok(())
}

pub fn toggle_theme(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    let mode = runtime.toggle_theme()?;
    let message = match mode {
        ThemeMode::Dark => "Theme set to dark.",
        ThemeMode::Light => "Theme set to light.",
    };
    output::print_success(message, format);
    Ok(())
}
