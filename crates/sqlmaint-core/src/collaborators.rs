//! Wiring of catalog, executor and notifier from configuration.

use crate::catalog::{CatalogReader, SnapshotCatalog};
use crate::config::{Config, ExecutionMode, NotificationChannel};
use crate::executor::{DryRunExecutor, ScriptExecutor, StatementExecutor};
use crate::maintenance::{MaintenanceRunner, MaintenanceScheduler, RunSettings};
use crate::notify::{DatabaseMailNotifier, FileNotifier, Notifier, StdoutNotifier};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// The three external channels a maintenance run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogReader>,
    pub executor: Arc<dyn StatementExecutor>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Build collaborators for `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog: Arc<dyn CatalogReader> =
            Arc::new(SnapshotCatalog::from_file(&config.catalog.snapshot_path)?);

        let executor: Arc<dyn StatementExecutor> = match config.execution.mode {
            ExecutionMode::DryRun => Arc::new(DryRunExecutor::new()),
            ExecutionMode::Script => {
                let path = config.execution.script_path.as_deref().ok_or_else(|| {
                    Error::Config("Script execution mode requires script_path".into())
                })?;
                Arc::new(ScriptExecutor::open(path)?)
            }
        };

        let notifier: Arc<dyn Notifier> = match config.notification.channel {
            NotificationChannel::Stdout => Arc::new(StdoutNotifier),
            NotificationChannel::File => {
                Arc::new(FileNotifier::new(config.notification.output_dir.clone()))
            }
            NotificationChannel::DatabaseMail => Arc::new(DatabaseMailNotifier::new(
                Arc::clone(&executor),
                config.notification.mail_profile.clone(),
            )),
        };

        info!(
            execution = ?config.execution.mode,
            notification = ?config.notification.channel,
            "Collaborators ready"
        );

        Ok(Self {
            catalog,
            executor,
            notifier,
        })
    }

    /// A runner for one pass.
    pub fn runner(&self, config: &Config) -> MaintenanceRunner {
        MaintenanceRunner::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.executor),
            Arc::clone(&self.notifier),
            RunSettings::from_config(config),
        )
    }

    /// A scheduler running both passes periodically.
    pub fn scheduler(&self, config: &Config) -> MaintenanceScheduler {
        MaintenanceScheduler::new(
            config.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.executor),
            Arc::clone(&self.notifier),
        )
    }
}
