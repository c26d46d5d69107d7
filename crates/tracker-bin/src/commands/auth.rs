//! Session commands.

use super::read_password;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_session::{Session, UserProfile, VerificationEmail};
use serde::Serialize;
use tracker_config_and_utils::ErrorKind;
use tracker_core::{PolicyState, TrackerRuntime};

#[derive(Serialize)]
struct StatusView<'a> {
    status: &'a str,
    user_id: Option<&'a str>,
    email: Option<&'a str>,
    display_name: Option<&'a str>,
    token_expires_at: Option<String>,
    last_error: Option<ErrorKind>,
    entries: usize,
    sync_status: &'a str,
    policy: &'a PolicyState,
}

fn print_session(session: &Session, headline: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("{}", headline);
            output::print_row("Status", session.status.as_str());
            output::print_row("Email", output::or_dash(session.email.as_deref()));
            if let Some(error) = session.last_error {
                output::print_row("Last error", &error.to_string());
            }
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "message": headline,
            "status": session.status,
            "user_id": session.user_id,
            "email": session.email,
            "last_error": session.last_error,
        })),
    }
}

/// Create an account.
pub async fn signup(
    runtime: &TrackerRuntime,
    email: &str,
    password: Option<String>,
    confirmation: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let prompted = password.is_none();
    let password = read_password(password, "Password: ")?;
    let confirmation = match confirmation {
        Some(confirmation) => confirmation,
        None if prompted => read_password(None, "Confirm password: ")?,
        None => password.clone(),
    };

    let session = runtime.sign_up(email, &password, &confirmation).await?;
    print_session(
        &session,
        "Account created. Check your inbox, then run 'expense-tracker verify'.",
        format,
    );
    Ok(())
}

/// Sign in.
pub async fn login(
    runtime: &TrackerRuntime,
    email: &str,
    password: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let password = read_password(password, "Password: ")?;
    let session = runtime.log_in(email, &password).await?;
    let headline = if session.status.is_verified() {
        "Logged in."
    } else {
        "Logged in. Email not verified yet."
    };
    print_session(&session, headline, format);
    Ok(())
}

/// Sign out.
pub async fn logout(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    if !runtime.session().status.has_credentials() {
        output::print_success("Not logged in.", format);
        return Ok(());
    }
    runtime.log_out().await?;
    output::print_success("Logged out.", format);
    Ok(())
}

/// Show the session, ledger and premium status.
pub fn status(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    let session = runtime.session();
    let ledger = runtime.ledger();
    let policy = runtime.policy();

    match format {
        OutputFormat::Text => {
            output::print_heading("Session");
            output::print_row("Status", session.status.as_str());
            output::print_row("Email", output::or_dash(session.email.as_deref()));
            output::print_row("User", output::or_dash(session.user_id.as_deref()));
            if let Some(name) = session.profile.as_ref().and_then(|p| p.display_name.as_deref()) {
                output::print_row("Name", name);
            }
            if let Some(expires) = session.token_expires_at {
                output::print_row("Token expires", &expires.to_rfc3339());
            }
            if let Some(error) = session.last_error {
                output::print_row("Last error", &error.to_string());
            }

            output::print_heading("Ledger");
            output::print_row("Entries", &ledger.entries.len().to_string());
            output::print_row("Total", &ledger.total.to_string());
            output::print_row("Sync", ledger.sync_status.as_str());

            output::print_heading("Premium");
            output::print_row("Threshold", &policy.threshold.to_string());
            output::print_row("Offer", if policy.premium_offer { "yes" } else { "no" });
            output::print_row("Active", if policy.premium_activated { "yes" } else { "no" });
            output::print_row("Theme", policy.effective_theme.as_str());
        }
        OutputFormat::Json => output::print_json(&StatusView {
            status: session.status.as_str(),
            user_id: session.user_id.as_deref(),
            email: session.email.as_deref(),
            display_name: session
                .profile
                .as_ref()
                .and_then(|p| p.display_name.as_deref()),
            token_expires_at: session.token_expires_at.map(|t| t.to_rfc3339()),
            last_error: session.last_error,
            entries: ledger.entries.len(),
            sync_status: ledger.sync_status.as_str(),
            policy: &policy,
        }),
    }
    Ok(())
}

/// Re-check email verification.
pub async fn verify(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    if runtime.check_verification().await? {
        output::print_success("Email verified.", format);
    } else {
        output::print_success(
            "Email not verified yet. Run 'expense-tracker resend-verification' for a new link.",
            format,
        );
    }
    Ok(())
}

/// Send the verification email again.
pub async fn resend_verification(runtime: &TrackerRuntime, format: &OutputFormat) -> Result<()> {
    let message = match runtime.send_verification_email().await? {
        VerificationEmail::Sent => "Verification email sent.",
        VerificationEmail::AlreadyVerified => "Email already verified.",
    };
    output::print_success(message, format);
    Ok(())
}

/// Request a password reset. The reply never reveals whether the account exists.
pub async fn reset_password(
    runtime: &TrackerRuntime,
    email: &str,
    format: &OutputFormat,
) -> Result<()> {
    let notice = runtime.request_password_reset(email).await?;
    output::print_success(notice, format);
    Ok(())
}

/// Show the profile, or update it when any field is given.
pub async fn profile(
    runtime: &TrackerRuntime,
    display_name: Option<String>,
    photo_url: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let session = if display_name.is_none() && photo_url.is_none() {
        runtime.session()
    } else {
        let current = runtime.session().profile.unwrap_or_default();
        let profile = UserProfile {
            display_name: display_name.or(current.display_name),
            photo_url: photo_url.or(current.photo_url),
        };
        runtime.update_profile(profile).await?
    };

    let profile = session.profile.unwrap_or_default();
    match format {
        OutputFormat::Text => {
            output::print_row("Email", output::or_dash(session.email.as_deref()));
            output::print_row("Name", output::or_dash(profile.display_name.as_deref()));
            output::print_row("Photo", output::or_dash(profile.photo_url.as_deref()));
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "email": session.email,
            "profile": profile,
        })),
    }
    Ok(())
}
