//! Scheduled maintenance until interrupted.

use super::spawn_signal_handler;
use anyhow::Result;
use sqlmaint_core::{Collaborators, Config};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Start the scheduler and block until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    info!(
        database = %config.database.name,
        index_interval = config.schedule.index_interval_seconds,
        statistics_interval = config.schedule.statistics_interval_seconds,
        "Starting scheduled maintenance"
    );

    let collaborators = Collaborators::from_config(&config)?;
    let scheduler = Arc::new(collaborators.scheduler(&config));
    scheduler.clone().start().await;

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    spawn_signal_handler(shutdown_tx);
    let _ = shutdown_rx.recv().await;

    scheduler.stop().await;

    for (name, task) in scheduler.get_task_statuses() {
        info!(
            task = %name,
            successes = task.success_count,
            failures = task.failure_count,
            "Task totals"
        );
    }

    Ok(())
}
