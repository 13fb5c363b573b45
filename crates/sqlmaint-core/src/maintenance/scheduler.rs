//! Background maintenance task scheduler.
//!
//! Manages periodic maintenance tasks:
//! - Index maintenance: reorganize or rebuild fragmented indexes
//! - Statistics maintenance: refresh outdated statistics with a full scan
//!
//! Both tasks target the same database, so passes never overlap: scheduled
//! and triggered runs take the same run lock.

use super::runner::{
    IndexRunOptions, MaintenanceRunner, RunSettings, RunSummary, StatisticsRunOptions,
};
use crate::catalog::CatalogReader;
use crate::config::Config;
use crate::executor::StatementExecutor;
use crate::notify::Notifier;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Task name of the index pass.
pub const INDEX_TASK: &str = "index_maintenance";
/// Task name of the statistics pass.
pub const STATISTICS_TASK: &str = "statistics_maintenance";

/// Status of a maintenance task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Task is idle, waiting for next run
    Idle,
    /// Task is currently running
    Running,
    /// Task completed successfully
    Completed { duration: Duration },
    /// Task failed
    Failed { error: String },
    /// Task is disabled
    Disabled,
}

/// Information about a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub status: TaskStatus,
    pub last_run: Option<Instant>,
    pub success_count: u64,
    pub failure_count: u64,
}

/// Maintenance task scheduler.
pub struct MaintenanceScheduler {
    config: Config,
    catalog: Arc<dyn CatalogReader>,
    executor: Arc<dyn StatementExecutor>,
    notifier: Arc<dyn Notifier>,
    shutdown_tx: broadcast::Sender<()>,
    run_lock: Mutex<()>,
    tasks: RwLock<HashMap<String, TaskInfo>>,
    handles: RwLock<Vec<JoinHandle<()>>>,
}

impl MaintenanceScheduler {
    /// Create a new maintenance scheduler.
    pub fn new(
        config: Config,
        catalog: Arc<dyn CatalogReader>,
        executor: Arc<dyn StatementExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            config,
            catalog,
            executor,
            notifier,
            shutdown_tx,
            run_lock: Mutex::new(()),
            tasks: RwLock::new(HashMap::new()),
            handles: RwLock::new(Vec::new()),
        }
    }

    /// Start the maintenance scheduler.
    pub async fn start(self: Arc<Self>) {
        info!("Starting maintenance scheduler");
        let schedule = &self.config.schedule;

        if schedule.index_enabled {
            self.register_task(INDEX_TASK, TaskStatus::Idle);
            let handle = self.spawn_task(INDEX_TASK, schedule.index_interval_seconds);
            self.handles.write().push(handle);
        } else {
            self.register_task(INDEX_TASK, TaskStatus::Disabled);
        }

        if schedule.statistics_enabled {
            self.register_task(STATISTICS_TASK, TaskStatus::Idle);
            let handle = self.spawn_task(STATISTICS_TASK, schedule.statistics_interval_seconds);
            self.handles.write().push(handle);
        } else {
            self.register_task(STATISTICS_TASK, TaskStatus::Disabled);
        }

        info!(
            index = schedule.index_enabled,
            statistics = schedule.statistics_enabled,
            "Maintenance scheduler started"
        );
    }

    /// Stop the scheduler. A run in progress stops before its next candidate.
    pub async fn stop(&self) {
        info!("Stopping maintenance scheduler");

        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = std::mem::take(&mut *self.handles.write());
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
        }

        info!("Maintenance scheduler stopped");
    }

    fn register_task(&self, name: &str, status: TaskStatus) {
        let info = TaskInfo {
            name: name.to_string(),
            status,
            last_run: None,
            success_count: 0,
            failure_count: 0,
        };
        self.tasks.write().insert(name.to_string(), info);
    }

    fn update_task_status(&self, name: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.write().get_mut(name) {
            match &status {
                TaskStatus::Completed { .. } => {
                    task.success_count += 1;
                    task.last_run = Some(Instant::now());
                }
                TaskStatus::Failed { .. } => {
                    task.failure_count += 1;
                    task.last_run = Some(Instant::now());
                }
                _ => {}
            }
            task.status = status;
        }
    }

    /// Get status of all tasks.
    pub fn get_task_statuses(&self) -> HashMap<String, TaskInfo> {
        self.tasks.read().clone()
    }

    /// Get status of a specific task.
    pub fn get_task_status(&self, name: &str) -> Option<TaskInfo> {
        self.tasks.read().get(name).cloned()
    }

    fn spawn_task(self: &Arc<Self>, name: &'static str, interval_seconds: u64) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(interval_seconds.max(1));

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            // Skip the first immediate tick
            interval_timer.tick().await;

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        scheduler.run_scheduled(name).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!(task = name, "Task received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    async fn run_scheduled(&self, name: &str) {
        self.update_task_status(name, TaskStatus::Running);
        let start = Instant::now();

        debug!(task = name, "Starting scheduled maintenance");

        let summary = if name == INDEX_TASK {
            self.trigger_index_maintenance().await
        } else {
            self.trigger_statistics_maintenance().await
        };

        let duration = start.elapsed();
        match &summary.abort {
            None => {
                info!(
                    task = name,
                    succeeded = summary.succeeded(),
                    failed = summary.failed(),
                    skipped = summary.skipped(),
                    duration_ms = duration.as_millis(),
                    "Scheduled maintenance completed"
                );
                self.update_task_status(name, TaskStatus::Completed { duration });
            }
            Some(reason) => {
                error!(task = name, error = %reason, "Scheduled maintenance aborted");
                self.update_task_status(
                    name,
                    TaskStatus::Failed {
                        error: reason.to_string(),
                    },
                );
            }
        }
    }

    fn runner(&self) -> MaintenanceRunner {
        MaintenanceRunner::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.executor),
            Arc::clone(&self.notifier),
            RunSettings::from_config(&self.config),
        )
        .with_shutdown(self.shutdown_tx.subscribe())
    }

    /// Run index maintenance now. Waits for a pass already in progress.
    pub async fn trigger_index_maintenance(&self) -> RunSummary {
        let _guard = self.run_lock.lock().await;
        let options = IndexRunOptions::from_config(&self.config.index);
        self.runner().run_index_maintenance(&options).await
    }

    /// Run statistics maintenance now. Waits for a pass already in progress.
    pub async fn trigger_statistics_maintenance(&self) -> RunSummary {
        let _guard = self.run_lock.lock().await;
        let options = StatisticsRunOptions::from_config(&self.config.statistics);
        self.runner()
            .run_statistics_maintenance(&options, Utc::now())
            .await
    }
}
