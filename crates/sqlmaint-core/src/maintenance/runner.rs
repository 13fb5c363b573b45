//! Maintenance run orchestration.
//!
//! A run verifies its preconditions, reads candidates once, then classifies
//! and executes them strictly one after another. Per-object failures are
//! recorded and the loop moves on; only precondition failures stop a run.
//! Whatever happens, the report is built and handed to the notifier exactly
//! once at the end.

use super::classifier::{Action, IndexClassifier, RebuildMode, SkipReason, Thresholds};
use super::command::{CommandSynthesizer, VerifiedDatabase};
use super::log::{EntrySubject, ItemOutcome, ItemState, MaintenanceLogEntry, WorkItem};
use super::report::{Report, ReportBuilder, RunEnding, RunKind};
use super::staleness::{
    classify_statistics, is_outdated, order_by_staleness, staleness_cutoff, Staleness,
};
use crate::capability::CapabilityProfile;
use crate::catalog::{CatalogReader, FragmentationFilter, SizeGate};
use crate::config::{Config, IndexMaintenanceConfig, StatisticsMaintenanceConfig};
use crate::error::{CatalogError, PreconditionError};
use crate::executor::StatementExecutor;
use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Identity and delivery settings shared by every run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub server_name: String,
    pub database: String,
    pub recipients: String,
    pub subject_prefix: String,
    pub verbose: bool,
}

impl RunSettings {
    /// Settings from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            server_name: config.server.name.clone(),
            database: config.database.name.clone(),
            recipients: config.notification.recipients.clone(),
            subject_prefix: config.notification.subject_prefix.clone(),
            verbose: config.verbose,
        }
    }
}

/// Parameters of an index pass.
#[derive(Debug, Clone)]
pub struct IndexRunOptions {
    /// Unparsed rebuild mode; invalid values abort the run
    pub rebuild_mode: String,
    pub min_page_count: u64,
    pub thresholds: Thresholds,
    pub max_parallelism: Option<u16>,
    pub update_statistics_after_reorganize: bool,
}

impl IndexRunOptions {
    /// Options from the `[index]` section.
    pub fn from_config(config: &IndexMaintenanceConfig) -> Self {
        Self {
            rebuild_mode: config.rebuild_mode.clone(),
            min_page_count: config.min_page_count,
            thresholds: Thresholds {
                reorganize_percent: config.reorganize_threshold_percent,
                rebuild_percent: config.rebuild_threshold_percent,
            },
            max_parallelism: config.max_parallelism,
            update_statistics_after_reorganize: config.update_statistics_after_reorganize,
        }
    }
}

impl Default for IndexRunOptions {
    fn default() -> Self {
        Self::from_config(&IndexMaintenanceConfig::default())
    }
}

/// Parameters of a statistics pass.
#[derive(Debug, Clone)]
pub struct StatisticsRunOptions {
    pub days_since_update: u32,
    pub size_gate: SizeGate,
}

impl StatisticsRunOptions {
    /// Options from the `[statistics]` section.
    pub fn from_config(config: &StatisticsMaintenanceConfig) -> Self {
        Self {
            days_since_update: config.days_since_update,
            size_gate: config.size_gate,
        }
    }
}

impl Default for StatisticsRunOptions {
    fn default() -> Self {
        Self::from_config(&StatisticsMaintenanceConfig::default())
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub entries: Vec<MaintenanceLogEntry>,
    /// Fatal precondition that stopped the run
    pub abort: Option<PreconditionError>,
    /// Candidates not processed because of a shutdown signal
    pub cancelled_remaining: usize,
    pub report: Report,
    /// Delivery failure, if the notifier rejected the report
    pub notification_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Items that completed.
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Succeeded))
    }

    /// Items whose statements failed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    /// Items classified as skip.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped(_)))
    }

    /// Whether a precondition stopped the run.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }

    /// All statements sent to the executor, in order.
    pub fn statements(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(|e| e.statements.iter().map(String::as_str))
            .collect()
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

struct RunState {
    report: ReportBuilder,
    entries: Vec<MaintenanceLogEntry>,
    cancelled_remaining: usize,
}

/// Runs maintenance passes against one database.
pub struct MaintenanceRunner {
    catalog: Arc<dyn CatalogReader>,
    executor: Arc<dyn StatementExecutor>,
    notifier: Arc<dyn Notifier>,
    settings: RunSettings,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl MaintenanceRunner {
    /// Create a runner.
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        executor: Arc<dyn StatementExecutor>,
        notifier: Arc<dyn Notifier>,
        settings: RunSettings,
    ) -> Self {
        Self {
            catalog,
            executor,
            notifier,
            settings,
            shutdown: None,
        }
    }

    /// Stop between candidates when a shutdown signal arrives.
    pub fn with_shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run one index maintenance pass.
    pub async fn run_index_maintenance(&mut self, options: &IndexRunOptions) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!(
            "index_maintenance",
            %run_id,
            database = %self.settings.database
        );

        let mut state = self.new_state(RunKind::IndexMaintenance, run_id, started_at);
        let result = self
            .index_pass(options, &mut state)
            .instrument(span.clone())
            .await;

        self.finish(RunKind::IndexMaintenance, run_id, started_at, state, result.err())
            .instrument(span)
            .await
    }

    /// Run one statistics maintenance pass, measuring staleness from `now`.
    pub async fn run_statistics_maintenance(
        &mut self,
        options: &StatisticsRunOptions,
        now: DateTime<Utc>,
    ) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!(
            "statistics_maintenance",
            %run_id,
            database = %self.settings.database
        );

        let mut state = self.new_state(RunKind::StatisticsMaintenance, run_id, started_at);
        let result = self
            .statistics_pass(options, now, &mut state)
            .instrument(span.clone())
            .await;

        self.finish(
            RunKind::StatisticsMaintenance,
            run_id,
            started_at,
            state,
            result.err(),
        )
        .instrument(span)
        .await
    }

    fn new_state(&self, kind: RunKind, run_id: Uuid, started_at: DateTime<Utc>) -> RunState {
        let report = ReportBuilder::new(
            kind,
            &self.settings.server_name,
            &self.settings.database,
            run_id,
            started_at,
        )
        .with_subject_prefix(&self.settings.subject_prefix)
        .with_verbose(self.settings.verbose);

        RunState {
            report,
            entries: Vec::new(),
            cancelled_remaining: 0,
        }
    }

    async fn index_pass(
        &mut self,
        options: &IndexRunOptions,
        state: &mut RunState,
    ) -> Result<(), PreconditionError> {
        let mode: RebuildMode = options.rebuild_mode.parse()?;
        let database = self.verify_database().await?;
        let database_name = database.name().to_string();

        let level = self
            .catalog
            .compatibility_level(&database_name)
            .await
            .map_err(catalog_query)?;
        let edition = self
            .catalog
            .engine_edition_name()
            .await
            .map_err(catalog_query)?;
        let profile = CapabilityProfile::detect(&edition, level)?;

        state.report.add_note(format!(
            "Edition: {} (compatibility level {}), rebuild mode: {}",
            profile.edition, profile.compatibility_level, mode
        ));

        if mode == RebuildMode::OnlineOnly && !profile.online_rebuild_supported {
            return Err(PreconditionError::OnlineRebuildUnsupported { edition });
        }

        let filter = FragmentationFilter {
            min_page_count: options.min_page_count,
            min_fragmentation_percent: options.thresholds.reorganize_percent,
        };
        let mut candidates = self
            .catalog
            .list_fragmented_indexes(&database_name, &filter, &profile.lob_types)
            .await
            .map_err(catalog_query)?;
        candidates.sort_by(|a, b| b.fragmentation_percent.total_cmp(&a.fragmentation_percent));

        info!(
            candidates = candidates.len(),
            mode = %mode,
            online_supported = profile.online_rebuild_supported,
            "Starting index maintenance"
        );

        let classifier = IndexClassifier::new(&profile, mode, options.thresholds)
            .with_max_parallelism(options.max_parallelism);
        let synthesizer = CommandSynthesizer::new(database)
            .with_statistics_after_reorganize(options.update_statistics_after_reorganize);

        for (position, candidate) in candidates.iter().enumerate() {
            if self.shutdown_requested() {
                state.cancelled_remaining = candidates.len() - position;
                warn!(
                    remaining = state.cancelled_remaining,
                    "Shutdown requested, stopping index maintenance"
                );
                break;
            }

            let action = classifier.classify(candidate);
            debug!(
                object = %candidate.object,
                fragmentation = candidate.fragmentation_percent,
                action = action.name(),
                "Classified index"
            );

            let statements = synthesizer.statements(&action);
            let item = WorkItem::new(
                EntrySubject::Index {
                    fragmentation_percent: candidate.fragmentation_percent,
                },
                action,
            );
            state.entries.push(self.process(item, statements).await);
        }

        Ok(())
    }

    async fn statistics_pass(
        &mut self,
        options: &StatisticsRunOptions,
        now: DateTime<Utc>,
        state: &mut RunState,
    ) -> Result<(), PreconditionError> {
        let database = self.verify_database().await?;
        let database_name = database.name().to_string();
        let cutoff = staleness_cutoff(now, options.days_since_update);
        let gate = options.size_gate;

        state.report.add_note(format!(
            "Updating statistics not refreshed in {} days (last updated at or before {})",
            options.days_since_update,
            cutoff.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        let mut candidates = self
            .catalog
            .list_stale_statistics(&database_name, cutoff, &gate)
            .await
            .map_err(catalog_query)?;
        order_by_staleness(&mut candidates);

        info!(
            candidates = candidates.len(),
            days = options.days_since_update,
            "Starting statistics maintenance"
        );

        let synthesizer = CommandSynthesizer::new(database);
        let total = candidates.len();

        for (position, mut candidate) in candidates.into_iter().enumerate() {
            if self.shutdown_requested() {
                state.cancelled_remaining = total - position;
                warn!(
                    remaining = state.cancelled_remaining,
                    "Shutdown requested, stopping statistics maintenance"
                );
                break;
            }

            let subject = EntrySubject::Statistics {
                last_updated: candidate.last_updated,
            };

            if matches!(gate, SizeGate::MinRowCount { .. }) && candidate.current_row_count.is_none()
            {
                let object = candidate.object.clone();
                match self
                    .catalog
                    .table_row_count(&database_name, &object.schema, &object.table)
                    .await
                {
                    Ok(rows) => candidate.current_row_count = Some(rows),
                    Err(e) => {
                        warn!(object = %object, error = %e, "Failed to read table row count");
                        let mut item = WorkItem::new(
                            subject,
                            Action::UpdateStatisticsFullScan { object },
                        );
                        item.transition(ItemState::Executing);
                        item.transition(ItemState::Failed(format!(
                            "Failed to read row count: {}",
                            e
                        )));
                        state.entries.push(item.finish());
                        continue;
                    }
                }
            }

            let action = match classify_statistics(&candidate, cutoff, &gate) {
                Staleness::Stale => Action::UpdateStatisticsFullScan {
                    object: candidate.object.clone(),
                },
                Staleness::NotStale => Action::Skip {
                    object: candidate.object.clone(),
                    reason: if is_outdated(&candidate, cutoff) {
                        SkipReason::BelowSizeGate
                    } else {
                        SkipReason::StatisticsCurrent
                    },
                },
            };

            let statements = synthesizer.statements(&action);
            state
                .entries
                .push(self.process(WorkItem::new(subject, action), statements).await);
        }

        Ok(())
    }

    async fn verify_database(&self) -> Result<VerifiedDatabase, PreconditionError> {
        let name = &self.settings.database;
        match self.catalog.database_exists(name).await {
            Ok(true) => Ok(VerifiedDatabase::new(name.clone())),
            Ok(false) => Err(PreconditionError::DatabaseNotFound(name.clone())),
            Err(e) => Err(catalog_query(e)),
        }
    }

    /// Drive one item to a terminal state.
    async fn process(&self, mut item: WorkItem, statements: Vec<String>) -> MaintenanceLogEntry {
        let skip = match item.action() {
            Action::Skip { reason, .. } => Some(*reason),
            _ => None,
        };
        if let Some(reason) = skip {
            debug!(object = %item.action().object(), reason = %reason, "Skipping");
            item.transition(ItemState::Skipped(reason));
            return item.finish();
        }

        item.transition(ItemState::Executing);
        for (position, statement) in statements.iter().enumerate() {
            item.record_statement(statement);
            debug!(statement = %statement, "Executing maintenance statement");

            if let Err(e) = self.executor.execute(statement).await {
                warn!(
                    object = %item.action().object(),
                    action = item.action().name(),
                    error = %e,
                    "Maintenance statement failed"
                );
                let message = if position == 0 {
                    e.to_string()
                } else {
                    // Earlier statements of this item already committed.
                    format!(
                        "{} completed; {} failed: {}",
                        statement_kind(&statements[0]),
                        statement_kind(statement),
                        e
                    )
                };
                item.transition(ItemState::Failed(message));
                break;
            }
        }

        if item.transition(ItemState::Succeeded) {
            info!(
                object = %item.action().object(),
                action = item.action().name(),
                "Maintenance completed"
            );
        }

        item.finish()
    }

    fn shutdown_requested(&mut self) -> bool {
        match self.shutdown.as_mut() {
            Some(rx) => matches!(rx.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_))),
            None => false,
        }
    }

    async fn finish(
        &self,
        kind: RunKind,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        state: RunState,
        abort: Option<PreconditionError>,
    ) -> RunSummary {
        if let Some(reason) = &abort {
            error!(reason = %reason, "Maintenance run aborted");
        }

        let finished_at = Utc::now();
        let report = state.report.build(
            &state.entries,
            RunEnding {
                abort: abort.as_ref(),
                cancelled_remaining: state.cancelled_remaining,
            },
            finished_at,
        );

        let notification_error = match self
            .notifier
            .send(&self.settings.recipients, &report.subject, &report.body)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Failed to deliver maintenance report");
                Some(e.to_string())
            }
        };

        let summary = RunSummary {
            run_id,
            kind,
            entries: state.entries,
            abort,
            cancelled_remaining: state.cancelled_remaining,
            report,
            notification_error,
            started_at,
            finished_at,
        };

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            aborted = summary.is_aborted(),
            duration_ms = (finished_at - started_at).num_milliseconds(),
            "Maintenance run finished"
        );

        summary
    }
}

/// Short operator-facing name of a maintenance statement.
fn statement_kind(statement: &str) -> &'static str {
    if statement.starts_with("UPDATE STATISTICS") {
        "UPDATE STATISTICS"
    } else if statement.ends_with("REORGANIZE") {
        "REORGANIZE"
    } else if statement.contains(" REBUILD") {
        "REBUILD"
    } else {
        "statement"
    }
}

fn catalog_query(err: CatalogError) -> PreconditionError {
    PreconditionError::CatalogQuery(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LobType;
    use crate::catalog::{MaintenanceCandidate, ObjectName, StatisticsCandidate};
    use crate::error::{ExecutionError, NotifyError};
    use async_trait::async_trait;
    use chrono::Duration;
    use parking_lot::Mutex;
    use std::sync::RwLock;

    /// Mock catalog for testing.
    struct MockCatalog {
        databases: Vec<String>,
        edition: String,
        level: u16,
        indexes: RwLock<Vec<MaintenanceCandidate>>,
        statistics: Vec<StatisticsCandidate>,
        row_count: Option<u64>,
        fail_listing: bool,
    }

    impl MockCatalog {
        fn new() -> Self {
            Self {
                databases: vec!["Sales".into()],
                edition: "Enterprise Edition (64-bit)".into(),
                level: 150,
                indexes: RwLock::new(Vec::new()),
                statistics: Vec::new(),
                row_count: None,
                fail_listing: false,
            }
        }

        fn with_indexes(indexes: Vec<MaintenanceCandidate>) -> Self {
            let mock = Self::new();
            *mock.indexes.write().unwrap() = indexes;
            mock
        }
    }

    #[async_trait]
    impl CatalogReader for MockCatalog {
        async fn list_fragmented_indexes(
            &self,
            _database: &str,
            _filter: &FragmentationFilter,
            _lob_types: &[LobType],
        ) -> Result<Vec<MaintenanceCandidate>, CatalogError> {
            if self.fail_listing {
                return Err(CatalogError::Query("permission denied".into()));
            }
            Ok(self.indexes.read().unwrap().clone())
        }

        async fn list_stale_statistics(
            &self,
            _database: &str,
            _cutoff: DateTime<Utc>,
            _size_gate: &SizeGate,
        ) -> Result<Vec<StatisticsCandidate>, CatalogError> {
            Ok(self.statistics.clone())
        }

        async fn table_row_count(
            &self,
            _database: &str,
            schema: &str,
            table: &str,
        ) -> Result<u64, CatalogError> {
            self.row_count
                .ok_or_else(|| CatalogError::UnknownTable(format!("{}.{}", schema, table)))
        }

        async fn database_exists(&self, name: &str) -> Result<bool, CatalogError> {
            Ok(self.databases.iter().any(|d| d == name))
        }

        async fn compatibility_level(&self, _database: &str) -> Result<u16, CatalogError> {
            Ok(self.level)
        }

        async fn engine_edition_name(&self) -> Result<String, CatalogError> {
            Ok(self.edition.clone())
        }
    }

    /// Executor that fails statements containing a marker.
    #[derive(Default)]
    struct RecordingExecutor {
        fail_on: Option<String>,
        statements: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatementExecutor for RecordingExecutor {
        async fn execute(&self, statement: &str) -> Result<(), ExecutionError> {
            self.statements.lock().push(statement.to_string());
            match &self.fail_on {
                Some(marker) if statement.contains(marker.as_str()) => {
                    Err(ExecutionError::Engine("Transaction was deadlocked".into()))
                }
                _ => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct CapturingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CapturingNotifier {
        async fn send(&self, _recipients: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.sent.lock().push((subject.to_string(), body.to_string()));
            if self.fail {
                return Err(NotifyError::Delivery("smtp down".into()));
            }
            Ok(())
        }
    }

    fn settings() -> RunSettings {
        RunSettings {
            server_name: "SQLPROD01".into(),
            database: "Sales".into(),
            recipients: "dba@example.com".into(),
            subject_prefix: "[sqlmaint]".into(),
            verbose: false,
        }
    }

    fn index(name: &str, fragmentation: f64) -> MaintenanceCandidate {
        MaintenanceCandidate {
            object: ObjectName::index("dbo", "Orders", name),
            page_locks_enabled: true,
            contains_lob: false,
            fragmentation_percent: fragmentation,
            page_count: 5000,
        }
    }

    fn runner(
        catalog: MockCatalog,
        executor: Arc<RecordingExecutor>,
        notifier: Arc<CapturingNotifier>,
    ) -> MaintenanceRunner {
        MaintenanceRunner::new(Arc::new(catalog), executor, notifier, settings())
    }

    #[tokio::test]
    async fn test_failed_item_does_not_stop_loop() {
        let catalog = MockCatalog::with_indexes(vec![
            index("IX_First", 80.0),
            index("IX_Broken", 60.0),
            index("IX_Last", 12.0),
        ]);
        let executor = Arc::new(RecordingExecutor {
            fail_on: Some("IX_Broken".into()),
            ..Default::default()
        });
        let notifier = Arc::new(CapturingNotifier::default());

        let summary = runner(catalog, executor.clone(), notifier.clone())
            .run_index_maintenance(&IndexRunOptions::default())
            .await;

        assert_eq!(summary.entries.len(), 3);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.entries[1].outcome,
            ItemOutcome::Failed("Transaction was deadlocked".into())
        );
        // Reorganize plus the follow-up statistics update.
        assert_eq!(summary.entries[2].statements.len(), 2);
        assert_eq!(executor.statements.lock().len(), 4);
        assert!(summary
            .report
            .body
            .contains("FAILED to rebuild Index: dbo.Orders.IX_Broken"));
        assert_eq!(notifier.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_follow_up_names_completed_statement() {
        let catalog = MockCatalog::with_indexes(vec![index("IX_Reorg", 12.0)]);
        let executor = Arc::new(RecordingExecutor {
            fail_on: Some("UPDATE STATISTICS".into()),
            ..Default::default()
        });

        let summary = runner(catalog, executor, Arc::new(CapturingNotifier::default()))
            .run_index_maintenance(&IndexRunOptions::default())
            .await;

        assert_eq!(
            summary.entries[0].outcome,
            ItemOutcome::Failed(
                "REORGANIZE completed; UPDATE STATISTICS failed: Transaction was deadlocked"
                    .into()
            )
        );
        assert!(summary.report.body.contains(
            "FAILED to update statistics for Index: dbo.Orders.IX_Reorg was 12 percent fragmented: \
             REORGANIZE completed; UPDATE STATISTICS failed"
        ));
    }

    #[tokio::test]
    async fn test_candidates_processed_most_fragmented_first() {
        let catalog = MockCatalog::with_indexes(vec![
            index("IX_Low", 9.0),
            index("IX_High", 90.0),
            index("IX_Mid", 40.0),
        ]);
        let executor = Arc::new(RecordingExecutor::default());

        let summary = runner(catalog, executor, Arc::new(CapturingNotifier::default()))
            .run_index_maintenance(&IndexRunOptions::default())
            .await;

        let order: Vec<_> = summary
            .entries
            .iter()
            .map(|e| e.object.index.clone().unwrap())
            .collect();
        assert_eq!(order, vec!["IX_High", "IX_Mid", "IX_Low"]);
    }

    #[tokio::test]
    async fn test_invalid_rebuild_mode_aborts_with_report() {
        let executor = Arc::new(RecordingExecutor::default());
        let notifier = Arc::new(CapturingNotifier::default());
        let options = IndexRunOptions {
            rebuild_mode: "whenever".into(),
            ..Default::default()
        };

        let summary = runner(
            MockCatalog::with_indexes(vec![index("IX_A", 50.0)]),
            executor.clone(),
            notifier.clone(),
        )
        .run_index_maintenance(&options)
        .await;

        assert_eq!(
            summary.abort,
            Some(PreconditionError::InvalidRebuildMode("whenever".into()))
        );
        assert!(summary.entries.is_empty());
        assert!(executor.statements.lock().is_empty());
        assert!(notifier.sent.lock()[0].1.contains("Invalid rebuild mode"));
    }

    #[tokio::test]
    async fn test_online_only_on_standard_edition_aborts() {
        let mut catalog = MockCatalog::with_indexes(vec![index("IX_A", 50.0)]);
        catalog.edition = "Standard Edition (64-bit)".into();
        let options = IndexRunOptions {
            rebuild_mode: "online_only".into(),
            ..Default::default()
        };

        let summary = runner(
            catalog,
            Arc::new(RecordingExecutor::default()),
            Arc::new(CapturingNotifier::default()),
        )
        .run_index_maintenance(&options)
        .await;

        assert!(matches!(
            summary.abort,
            Some(PreconditionError::OnlineRebuildUnsupported { .. })
        ));
        assert!(summary.report.body.contains("Edition: Standard Edition"));
    }

    #[tokio::test]
    async fn test_unsupported_compatibility_level_aborts() {
        let mut catalog = MockCatalog::with_indexes(vec![index("IX_A", 50.0)]);
        catalog.level = 80;

        let summary = runner(
            catalog,
            Arc::new(RecordingExecutor::default()),
            Arc::new(CapturingNotifier::default()),
        )
        .run_index_maintenance(&IndexRunOptions::default())
        .await;

        assert_eq!(
            summary.abort,
            Some(PreconditionError::UnsupportedCompatibilityLevel(80))
        );
        assert!(summary.entries.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_failure_aborts() {
        let mut catalog = MockCatalog::new();
        catalog.fail_listing = true;

        let summary = runner(
            catalog,
            Arc::new(RecordingExecutor::default()),
            Arc::new(CapturingNotifier::default()),
        )
        .run_index_maintenance(&IndexRunOptions::default())
        .await;

        assert!(matches!(
            summary.abort,
            Some(PreconditionError::CatalogQuery(_))
        ));
        assert!(summary.report.body.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_notification_failure_is_reported() {
        let notifier = Arc::new(CapturingNotifier {
            fail: true,
            ..Default::default()
        });

        let summary = runner(
            MockCatalog::new(),
            Arc::new(RecordingExecutor::default()),
            notifier,
        )
        .run_index_maintenance(&IndexRunOptions::default())
        .await;

        assert!(summary.notification_error.unwrap().contains("smtp down"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_between_candidates() {
        let catalog = MockCatalog::with_indexes(vec![index("IX_A", 50.0), index("IX_B", 40.0)]);
        let executor = Arc::new(RecordingExecutor::default());
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let summary = runner(catalog, executor.clone(), Arc::new(CapturingNotifier::default()))
            .with_shutdown(rx)
            .run_index_maintenance(&IndexRunOptions::default())
            .await;

        assert!(summary.entries.is_empty());
        assert_eq!(summary.cancelled_remaining, 2);
        assert!(executor.statements.lock().is_empty());
        assert!(summary.report.subject.ends_with(": cancelled"));
    }

    #[tokio::test]
    async fn test_row_count_failure_is_item_level() {
        let now = Utc::now();
        let mut catalog = MockCatalog::new();
        catalog.statistics = vec![
            StatisticsCandidate {
                object: ObjectName::index("dbo", "Orders", "ST_A"),
                last_updated: None,
                rows_at_last_update: 0,
                current_row_count: None,
                page_count: None,
            },
            StatisticsCandidate {
                object: ObjectName::index("dbo", "Customers", "ST_B"),
                last_updated: Some(now - Duration::days(45)),
                rows_at_last_update: 80_000,
                current_row_count: Some(90_000),
                page_count: None,
            },
        ];
        let executor = Arc::new(RecordingExecutor::default());
        let options = StatisticsRunOptions {
            days_since_update: 30,
            size_gate: SizeGate::MinRowCount { minimum: 10_000 },
        };

        let summary = runner(catalog, executor.clone(), Arc::new(CapturingNotifier::default()))
            .run_statistics_maintenance(&options, now)
            .await;

        assert!(!summary.is_aborted());
        assert_eq!(summary.entries.len(), 2);
        assert!(matches!(
            &summary.entries[0].outcome,
            ItemOutcome::Failed(msg) if msg.starts_with("Failed to read row count")
        ));
        assert_eq!(summary.entries[1].outcome, ItemOutcome::Succeeded);
        assert_eq!(
            *executor.statements.lock(),
            vec!["UPDATE STATISTICS [Sales].[dbo].[Customers] [ST_B] WITH FULLSCAN"]
        );
    }

    #[tokio::test]
    async fn test_statistics_below_gate_after_lookup_is_skipped() {
        let now = Utc::now();
        let mut catalog = MockCatalog::new();
        catalog.row_count = Some(50);
        catalog.statistics = vec![StatisticsCandidate {
            object: ObjectName::index("dbo", "Tiny", "ST_T"),
            last_updated: None,
            rows_at_last_update: 0,
            current_row_count: None,
            page_count: None,
        }];
        let options = StatisticsRunOptions {
            days_since_update: 30,
            size_gate: SizeGate::MinRowCount { minimum: 1000 },
        };

        let summary = runner(
            catalog,
            Arc::new(RecordingExecutor::default()),
            Arc::new(CapturingNotifier::default()),
        )
        .run_statistics_maintenance(&options, now)
        .await;

        assert_eq!(
            summary.entries[0].outcome,
            ItemOutcome::Skipped(SkipReason::BelowSizeGate)
        );
    }

    #[tokio::test]
    async fn test_statistics_missing_database() {
        let mut catalog = MockCatalog::new();
        catalog.databases.clear();

        let summary = runner(
            catalog,
            Arc::new(RecordingExecutor::default()),
            Arc::new(CapturingNotifier::default()),
        )
        .run_statistics_maintenance(&StatisticsRunOptions::default(), Utc::now())
        .await;

        assert_eq!(
            summary.abort,
            Some(PreconditionError::DatabaseNotFound("Sales".into()))
        );
        assert!(summary.report.body.contains("Database not found: Sales"));
    }
}
