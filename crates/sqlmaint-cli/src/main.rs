//! sqlmaint CLI - SQL Server index and statistics maintenance tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlmaint_core::config::LogFormat;
use sqlmaint_core::{Config, Error};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
///
/// A maintenance run that aborts on a precondition still exits with
/// `Success`: the failure is stated in the delivered report.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Catalog snapshot could not be loaded or queried
    CatalogError = 2,
    /// Statement executor could not be opened or rejected a setup statement
    ExecutionError = 3,
    /// The report could not be delivered
    NotificationError = 4,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Convert an error to an exit code.
    fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<Error>() {
            Some(Error::Config(_)) | Some(Error::Serialization(_)) | Some(Error::Io(_)) => {
                ExitCode::ConfigError
            }
            Some(Error::Catalog(_)) | Some(Error::Precondition(_)) => ExitCode::CatalogError,
            Some(Error::Execution(_)) => ExitCode::ExecutionError,
            Some(Error::Notification(_)) => ExitCode::NotificationError,
            Some(Error::Shutdown) => ExitCode::SignalInterrupt,
            None => ExitCode::RuntimeError,
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "sqlmaint")]
#[command(about = "SQL Server index and statistics maintenance", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one index maintenance pass
    Indexes {
        /// Override the rebuild mode (online_only, offline_only, mixed)
        #[arg(long)]
        rebuild_mode: Option<String>,

        /// Append every executed statement to the report
        #[arg(long)]
        verbose_report: bool,
    },

    /// Run one statistics maintenance pass
    Statistics {
        /// Override the days-since-update threshold
        #[arg(long)]
        days: Option<u32>,

        /// Append every executed statement to the report
        #[arg(long)]
        verbose_report: bool,
    },

    /// Run both passes on their configured schedule until interrupted
    Run,

    /// Enable Database Mail on the server
    SetupMail,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Logging settings come from the config when it parses; otherwise defaults.
    let monitoring = toml::from_str::<Config>(
        &std::fs::read_to_string(config_path(&cli.config)).unwrap_or_default(),
    )
    .map(|config| config.monitoring)
    .unwrap_or_default();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_filter()),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    match execute_command(cli).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    let config = load_config(&config_path(&cli.config))?;

    match cli.command {
        Commands::Indexes {
            rebuild_mode,
            verbose_report,
        } => {
            commands::maintenance::indexes(config, rebuild_mode, verbose_report).await?;
        }

        Commands::Statistics {
            days,
            verbose_report,
        } => {
            commands::maintenance::statistics(config, days, verbose_report).await?;
        }

        Commands::Run => {
            commands::run::run(config).await?;
        }

        Commands::SetupMail => {
            commands::setup::setup_mail(config).await?;
        }

        Commands::Validate => {
            println!("Configuration is valid");
            println!("  Server: {}", config.server.name);
            println!("  Database: {}", config.database.name);
            println!("  Catalog snapshot: {}", config.catalog.snapshot_path.display());
        }
    }

    Ok(())
}

fn config_path(path: &Option<PathBuf>) -> PathBuf {
    path.clone().unwrap_or_else(|| PathBuf::from("sqlmaint.toml"))
}

fn load_config(path: &Path) -> Result<Config> {
    Ok(Config::from_file(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmaint_core::{CatalogError, NotifyError, PreconditionError};

    #[test]
    fn test_exit_codes_follow_error_kind() {
        let cases = [
            (Error::Config("bad".into()), ExitCode::ConfigError),
            (
                Error::Catalog(CatalogError::SnapshotLoad("missing".into())),
                ExitCode::CatalogError,
            ),
            (
                Error::Precondition(PreconditionError::DatabaseNotFound("Sales".into())),
                ExitCode::CatalogError,
            ),
            (
                Error::Notification(NotifyError::NoRecipients),
                ExitCode::NotificationError,
            ),
            (Error::Shutdown, ExitCode::SignalInterrupt),
        ];

        for (error, expected) in cases {
            assert_eq!(ExitCode::from_error(&anyhow::Error::from(error)), expected);
        }
        assert_eq!(
            ExitCode::from_error(&anyhow::anyhow!("boom")),
            ExitCode::RuntimeError
        );
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::parse_from([
            "sqlmaint",
            "--config",
            "prod.toml",
            "indexes",
            "--rebuild-mode",
            "offline_only",
            "--verbose-report",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        match cli.command {
            Commands::Indexes {
                rebuild_mode,
                verbose_report,
            } => {
                assert_eq!(rebuild_mode.as_deref(), Some("offline_only"));
                assert!(verbose_report);
            }
            _ => panic!("expected indexes command"),
        }
    }
}
