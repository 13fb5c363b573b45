//! Single-pass maintenance commands.

use super::spawn_signal_handler;
use anyhow::Result;
use chrono::Utc;
use sqlmaint_core::maintenance::{IndexRunOptions, RunSummary, StatisticsRunOptions};
use sqlmaint_core::{Collaborators, Config, Error};
use tokio::sync::broadcast;
use tracing::info;

/// Run one index maintenance pass.
pub async fn indexes(
    config: Config,
    rebuild_mode: Option<String>,
    verbose_report: bool,
) -> Result<()> {
    let config = with_index_overrides(config, rebuild_mode, verbose_report)?;

    info!(
        database = %config.database.name,
        rebuild_mode = %config.index.rebuild_mode,
        reorganize = config.index.reorganize_threshold_percent,
        rebuild = config.index.rebuild_threshold_percent,
        "Running index maintenance"
    );

    let collaborators = Collaborators::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    spawn_signal_handler(shutdown_tx);

    let summary = collaborators
        .runner(&config)
        .with_shutdown(shutdown_rx)
        .run_index_maintenance(&IndexRunOptions::from_config(&config.index))
        .await;

    finish(summary)
}

/// Run one statistics maintenance pass.
pub async fn statistics(config: Config, days: Option<u32>, verbose_report: bool) -> Result<()> {
    let config = with_statistics_overrides(config, days, verbose_report)?;

    info!(
        database = %config.database.name,
        days = config.statistics.days_since_update,
        size_gate = ?config.statistics.size_gate,
        "Running statistics maintenance"
    );

    let collaborators = Collaborators::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    spawn_signal_handler(shutdown_tx);

    let summary = collaborators
        .runner(&config)
        .with_shutdown(shutdown_rx)
        .run_statistics_maintenance(
            &StatisticsRunOptions::from_config(&config.statistics),
            Utc::now(),
        )
        .await;

    finish(summary)
}

/// Apply `indexes` flags and re-check the result.
fn with_index_overrides(
    mut config: Config,
    rebuild_mode: Option<String>,
    verbose_report: bool,
) -> Result<Config, Error> {
    if let Some(mode) = rebuild_mode {
        config.index.rebuild_mode = mode;
    }
    config.verbose |= verbose_report;
    config.validate()?;
    Ok(config)
}

/// Apply `statistics` flags and re-check the result.
fn with_statistics_overrides(
    mut config: Config,
    days: Option<u32>,
    verbose_report: bool,
) -> Result<Config, Error> {
    if let Some(days) = days {
        config.statistics.days_since_update = days;
    }
    config.verbose |= verbose_report;
    config.validate()?;
    Ok(config)
}

fn finish(summary: RunSummary) -> Result<()> {
    println!();
    println!("{} finished:", summary.kind.title());
    println!("  Run: {}", summary.run_id);
    println!("  Succeeded: {}", summary.succeeded());
    println!("  Failed: {}", summary.failed());
    println!("  Skipped: {}", summary.skipped());
    if let Some(reason) = &summary.abort {
        println!("  Aborted: {}", reason);
    }

    if let Some(error) = summary.notification_error {
        return Err(Error::Notification(sqlmaint_core::NotifyError::Delivery(error)).into());
    }
    if summary.cancelled_remaining > 0 {
        println!("  Not processed: {}", summary.cancelled_remaining);
        return Err(Error::Shutdown.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        toml::from_str(
            r#"
            [server]
            name = "SQLPROD01"

            [database]
            name = "Sales"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_days_override_is_rejected() {
        let err = with_statistics_overrides(create_test_config(), Some(0), false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_statistics_overrides_applied() {
        let config = with_statistics_overrides(create_test_config(), Some(7), true).unwrap();
        assert_eq!(config.statistics.days_since_update, 7);
        assert!(config.verbose);
    }

    #[test]
    fn test_index_overrides_applied() {
        let config =
            with_index_overrides(create_test_config(), Some("offline_only".into()), false)
                .unwrap();
        assert_eq!(config.index.rebuild_mode, "offline_only");
        assert!(!config.verbose);
    }
}
