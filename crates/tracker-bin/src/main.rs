//! expense-tracker: command-line front end for the tracker runtime.
//!
//! Every invocation restores the stored session, runs one command and exits.
//! Credentials and the theme preference persist under `~/.expense-tracker`.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use ledger_sync::Category;
use output::OutputFormat;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{debug, error};
use tracker_config_and_utils::{Config, Paths};
use tracker_core::{RuntimeError, TrackerRuntime};

#[derive(Parser)]
#[command(name = "expense-tracker")]
#[command(about = "Track expenses against a remote ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "text")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TRACKER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for config, credentials and logs (default: ~/.expense-tracker)
    #[arg(long, global = true, env = "TRACKER_BASE_DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account; the session then awaits email verification
    Signup {
        email: String,
        /// Prompted for when omitted
        #[arg(long, env = "TRACKER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Defaults to --password when that is given
        #[arg(long, env = "TRACKER_PASSWORD_CONFIRM", hide_env_values = true)]
        confirm_password: Option<String>,
    },
    /// Sign in with email and password
    Login {
        email: String,
        /// Prompted for when omitted
        #[arg(long, env = "TRACKER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and forget the stored credential
    Logout,
    /// Show session, ledger and premium status
    Status,
    /// Ask the identity service whether the email is verified now
    Verify,
    /// Send the verification email again
    ResendVerification,
    /// Request a password reset email
    ResetPassword { email: String },
    /// Show or update the profile
    Profile {
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        photo_url: Option<String>,
    },
    /// List ledger entries, newest first
    List,
    /// Add an entry
    Add {
        amount: Decimal,
        description: String,
        #[arg(long, short, default_value = "Other")]
        category: Category,
        /// RFC 3339 timestamp (default: now)
        #[arg(long)]
        date: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Change an existing entry
    Edit {
        id: String,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, short)]
        category: Option<Category>,
    },
    /// Delete an entry
    Delete { id: String },
    /// Print the ledger total
    Total,
    /// Export the ledger as CSV
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Follow remote changes until interrupted
    Watch,
    /// Activate premium once the total crossed the threshold
    ActivatePremium,
    /// Switch between light and dark theme
    ToggleTheme,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    let paths = match &cli.base_dir {
        Some(dir) => Paths::with_base_dir(dir.clone()),
        None => match Paths::new() {
            Ok(paths) => paths,
            Err(e) => {
                output::print_error(&e.to_string(), None, &format);
                std::process::exit(1);
            }
        },
    };

    let config = match Config::load(&paths) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&format!("Failed to load config: {}", e), None, &format);
            std::process::exit(1);
        }
    };
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    tracker_config_and_utils::init_logging(&log_level, &paths);

    let runtime = match TrackerRuntime::from_config(&config, &paths) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build runtime");
            output::print_error(&e.to_string(), Some(e.kind()), &format);
            std::process::exit(1);
        }
    };

    let result = match runtime.start().await {
        Ok(session) => {
            debug!(status = %session.status, "Session restored");
            run(&runtime, cli.command, &format).await
        }
        Err(e) => Err(e.into()),
    };
    runtime.shutdown();

    if let Err(e) = result {
        let kind = e.downcast_ref::<RuntimeError>().map(RuntimeError::kind);
        debug!(error = %e, "Command failed");
        output::print_error(&e.to_string(), kind, &format);
        std::process::exit(1);
    }
}

async fn run(runtime: &TrackerRuntime, command: Commands, format: &OutputFormat) -> anyhow::Result<()> {
    match command {
        Commands::Signup {
            email,
            password,
            confirm_password,
        } => commands::signup(runtime, &email, password, confirm_password, format).await,
        Commands::Login { email, password } => {
            commands::login(runtime, &email, password, format).await
        }
        Commands::Logout => commands::logout(runtime, format).await,
        Commands::Status => commands::status(runtime, format),
        Commands::Verify => commands::verify(runtime, format).await,
        Commands::ResendVerification => commands::resend_verification(runtime, format).await,
        Commands::ResetPassword { email } => {
            commands::reset_password(runtime, &email, format).await
        }
        Commands::Profile {
            display_name,
            photo_url,
        } => commands::profile(runtime, display_name, photo_url, format).await,
        Commands::List => commands::list(runtime, format).await,
        Commands::Add {
            amount,
            description,
            category,
            date,
        } => commands::add(runtime, amount, description, category, date, format).await,
        Commands::Edit {
            id,
            amount,
            description,
            category,
        } => commands::edit(runtime, &id, amount, description, category, format).await,
        Commands::Delete { id } => commands::delete(runtime, &id, format).await,
        Commands::Total => commands::total(runtime, format).await,
        Commands::Export { output } => commands::export(runtime, output, format).await,
        Commands::Watch => commands::watch(runtime, format).await,
        Commands::ActivatePremium => commands::activate_premium(runtime, format),
        Commands::ToggleTheme => commands::toggle_theme(runtime, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_category() {
        let cli = Cli::try_parse_from([
            "expense-tracker",
            "add",
            "12.50",
            "Lunch",
            "--category",
            "food",
        ])
        .unwrap();
        match cli.command {
            Commands::Add {
                amount,
                description,
                category,
                date,
            } => {
                assert_eq!(amount, Decimal::new(1250, 2));
                assert_eq!(description, "Lunch");
                assert_eq!(category, Category::Food);
                assert!(date.is_none());
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        let result = Cli::try_parse_from(["expense-tracker", "add", "5", "x", "-c", "bills"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_format_flag() {
        let cli = Cli::try_parse_from(["expense-tracker", "total", "--format", "json"]).unwrap();
        assert!(cli.format.is_json());
        assert!(matches!(cli.command, Commands::Total));
    }
}
