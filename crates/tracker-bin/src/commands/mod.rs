//! CLI command implementations.

mod auth;
mod ledger;
mod premium;

pub use auth::{login, logout, profile, resend_verification, reset_password, signup, status, verify};
pub use ledger::{add, delete, edit, export, list, total, watch};
pub use premium::{activate_premium, toggle_theme};

use anyhow::{Context, Result};

/// Use the password given on the command line, or prompt without echo.
fn read_password(provided: Option<String>, prompt: &str) -> Result<String> {
    match provided {
        Some(password) => Ok(password),
        None => rpassword::prompt_password(prompt).context("Failed to read password"),
    }
}
