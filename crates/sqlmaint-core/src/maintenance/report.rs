//! Plain-text run reports.
//!
//! Layout, in order: header (server, database, run id, start time), one line
//! per processed candidate, abort or cancellation notice, footer with counts
//! and timing, and in verbose mode every statement that was executed.

use super::classifier::Action;
use super::log::{EntrySubject, ItemOutcome, MaintenanceLogEntry};
use crate::error::PreconditionError;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use uuid::Uuid;

/// Which maintenance pass produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    IndexMaintenance,
    StatisticsMaintenance,
}

impl RunKind {
    /// Human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            RunKind::IndexMaintenance => "Index maintenance",
            RunKind::StatisticsMaintenance => "Statistics maintenance",
        }
    }
}

/// A finished report.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub subject: String,
    pub body: String,
}

/// How a run ended, as far as the report is concerned.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunEnding<'a> {
    /// Fatal precondition that stopped the run
    pub abort: Option<&'a PreconditionError>,
    /// Candidates left unprocessed after a shutdown signal
    pub cancelled_remaining: usize,
}

/// Assembles the report for one run.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    kind: RunKind,
    server: String,
    database: String,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    subject_prefix: String,
    verbose: bool,
    notes: Vec<String>,
}

impl ReportBuilder {
    /// Start a report.
    pub fn new(
        kind: RunKind,
        server: impl Into<String>,
        database: impl Into<String>,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            server: server.into(),
            database: database.into(),
            run_id,
            started_at,
            subject_prefix: String::new(),
            verbose: false,
            notes: Vec::new(),
        }
    }

    /// Prefix for the subject line.
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    /// Append executed statements to the body.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Add a header note, e.g. the detected capabilities.
    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Render the report.
    pub fn build(
        &self,
        entries: &[MaintenanceLogEntry],
        ending: RunEnding<'_>,
        finished_at: DateTime<Utc>,
    ) -> Report {
        let succeeded = count(entries, |o| matches!(o, ItemOutcome::Succeeded));
        let failed = count(entries, |o| matches!(o, ItemOutcome::Failed(_)));
        let skipped = count(entries, |o| matches!(o, ItemOutcome::Skipped(_)));

        let mut body = String::new();
        let _ = writeln!(body, "{} report", self.kind.title());
        let _ = writeln!(body, "Server: {}", self.server);
        let _ = writeln!(body, "Database: {}", self.database);
        let _ = writeln!(body, "Run: {}", self.run_id);
        let _ = writeln!(body, "Started: {}", format_time(self.started_at));
        for note in &self.notes {
            let _ = writeln!(body, "{}", note);
        }
        body.push('\n');

        if entries.is_empty() && ending.abort.is_none() {
            body.push_str("No objects required maintenance.\n");
        }
        for entry in entries {
            let _ = writeln!(body, "{}", describe_entry(entry));
        }

        if let Some(reason) = ending.abort {
            let _ = writeln!(body, "\nRun aborted: {}", reason);
        }
        if ending.cancelled_remaining > 0 {
            let _ = writeln!(
                body,
                "\nRun cancelled: {} candidate(s) not processed.",
                ending.cancelled_remaining
            );
        }

        let elapsed = (finished_at - self.started_at).num_seconds().max(0);
        let _ = writeln!(
            body,
            "\nSummary: {} succeeded, {} failed, {} skipped",
            succeeded, failed, skipped
        );
        let _ = writeln!(body, "Started: {}", format_time(self.started_at));
        let _ = writeln!(body, "Finished: {}", format_time(finished_at));
        let _ = writeln!(
            body,
            "Elapsed: {:02}:{:02}:{:02}",
            elapsed / 3600,
            (elapsed % 3600) / 60,
            elapsed % 60
        );

        if self.verbose {
            body.push_str("\nStatements executed:\n");
            let statements: Vec<&String> = entries.iter().flat_map(|e| &e.statements).collect();
            if statements.is_empty() {
                body.push_str("(none)\n");
            }
            for statement in statements {
                let _ = writeln!(body, "{}", statement);
            }
        }

        let status = if ending.abort.is_some() {
            "aborted"
        } else if ending.cancelled_remaining > 0 {
            "cancelled"
        } else if failed > 0 {
            "completed with failures"
        } else {
            "succeeded"
        };
        let subject = format!(
            "{} on {}/{}: {}",
            self.kind.title(),
            self.server,
            self.database,
            status
        );
        let subject = if self.subject_prefix.is_empty() {
            subject
        } else {
            format!("{} {}", self.subject_prefix, subject)
        };

        Report { subject, body }
    }
}

fn count(entries: &[MaintenanceLogEntry], pred: impl Fn(&ItemOutcome) -> bool) -> usize {
    entries.iter().filter(|e| pred(&e.outcome)).count()
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// One report line for a processed candidate.
pub fn describe_entry(entry: &MaintenanceLogEntry) -> String {
    let kind = match (&entry.subject, entry.object.is_heap()) {
        (EntrySubject::Statistics { .. }, _) => "Statistics",
        (EntrySubject::Index { .. }, true) => "Heap",
        (EntrySubject::Index { .. }, false) => "Index",
    };
    let context = match &entry.subject {
        EntrySubject::Index {
            fragmentation_percent,
        } => format!("was {:.0} percent fragmented", fragmentation_percent),
        EntrySubject::Statistics {
            last_updated: Some(ts),
        } => format!("last updated {}", format_time(*ts)),
        EntrySubject::Statistics { last_updated: None } => "never updated".to_string(),
    };
    let hint = entry
        .action
        .hint()
        .map(|h| format!(" ({})", h))
        .unwrap_or_default();

    match &entry.outcome {
        ItemOutcome::Succeeded => {
            let verb = match entry.action {
                Action::ReorganizeIndex { .. } => "Reorganized",
                Action::UpdateStatisticsFullScan { .. } => "Updated",
                _ => "Rebuilt",
            };
            format!("{} {}: {}{} {}.", verb, kind, entry.object, hint, context)
        }
        ItemOutcome::Skipped(reason) => {
            format!("Skipped {}: {} {}: {}.", kind, entry.object, context, reason)
        }
        ItemOutcome::Failed(message) => {
            let verb = match entry.action {
                // Only the follow-up statistics update can fail after the first statement.
                Action::ReorganizeIndex { .. } if entry.statements.len() > 1 => {
                    "update statistics for"
                }
                Action::ReorganizeIndex { .. } => "reorganize",
                Action::UpdateStatisticsFullScan { .. } | Action::Skip { .. } => "update",
                _ => "rebuild",
            };
            format!(
                "FAILED to {} {}: {}{} {}: {}",
                verb, kind, entry.object, hint, context, message
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ObjectName;
    use crate::maintenance::classifier::{OnlineOption, RebuildHint, SkipReason};
    use chrono::Duration;

    fn entry(action: Action, fragmentation: f64, outcome: ItemOutcome) -> MaintenanceLogEntry {
        let now = Utc::now();
        MaintenanceLogEntry {
            object: action.object().clone(),
            subject: EntrySubject::Index {
                fragmentation_percent: fragmentation,
            },
            action,
            outcome,
            statements: vec!["ALTER TABLE [Sales].[dbo].[Staging] REBUILD".into()],
            started_at: now,
            finished_at: now,
        }
    }

    fn builder() -> ReportBuilder {
        let started = Utc::now() - Duration::seconds(3725);
        ReportBuilder::new(
            RunKind::IndexMaintenance,
            "SQLPROD01",
            "Sales",
            Uuid::new_v4(),
            started,
        )
        .with_subject_prefix("[sqlmaint]")
    }

    #[test]
    fn test_heap_rebuild_line() {
        let line = describe_entry(&entry(
            Action::RebuildHeap {
                object: ObjectName::heap("dbo", "Staging"),
                hint: RebuildHint {
                    online: OnlineOption::Online,
                    max_degree_of_parallelism: None,
                },
            },
            45.0,
            ItemOutcome::Succeeded,
        ));
        assert_eq!(
            line,
            "Rebuilt Heap: dbo.Staging (online) was 45 percent fragmented."
        );
    }

    #[test]
    fn test_reorganize_and_skip_lines() {
        let line = describe_entry(&entry(
            Action::ReorganizeIndex {
                object: ObjectName::index("dbo", "Orders", "IX_A"),
            },
            8.2,
            ItemOutcome::Succeeded,
        ));
        assert_eq!(
            line,
            "Reorganized Index: dbo.Orders.IX_A was 8 percent fragmented."
        );

        let line = describe_entry(&entry(
            Action::Skip {
                object: ObjectName::index("dbo", "Orders", "IX_B"),
                reason: SkipReason::OnlineRebuildUnavailable,
            },
            60.0,
            ItemOutcome::Skipped(SkipReason::OnlineRebuildUnavailable),
        ));
        assert!(line.starts_with("Skipped Index: dbo.Orders.IX_B was 60 percent fragmented"));
        assert!(line.contains("LOB column or edition"));
    }

    #[test]
    fn test_failure_line_keeps_engine_text() {
        let line = describe_entry(&entry(
            Action::rebuild_index(
                ObjectName::index("dbo", "Orders", "PK_Orders"),
                RebuildHint {
                    online: OnlineOption::Offline,
                    max_degree_of_parallelism: Some(2),
                },
            ),
            91.0,
            ItemOutcome::Failed("Transaction was deadlocked".into()),
        ));
        assert_eq!(
            line,
            "FAILED to rebuild Index: dbo.Orders.PK_Orders (offline, maxdop 2) was 91 percent fragmented: Transaction was deadlocked"
        );
    }

    #[test]
    fn test_report_summary_and_footer() {
        let entries = vec![
            entry(
                Action::RebuildHeap {
                    object: ObjectName::heap("dbo", "Staging"),
                    hint: RebuildHint {
                        online: OnlineOption::EngineDefault,
                        max_degree_of_parallelism: None,
                    },
                },
                45.0,
                ItemOutcome::Succeeded,
            ),
            entry(
                Action::ReorganizeIndex {
                    object: ObjectName::index("dbo", "Orders", "IX_A"),
                },
                9.0,
                ItemOutcome::Failed("timeout".into()),
            ),
        ];

        let report = builder().build(&entries, RunEnding::default(), Utc::now());

        assert_eq!(
            report.subject,
            "[sqlmaint] Index maintenance on SQLPROD01/Sales: completed with failures"
        );
        assert!(report.body.starts_with("Index maintenance report\nServer: SQLPROD01\n"));
        assert!(report.body.contains("Summary: 1 succeeded, 1 failed, 0 skipped"));
        assert!(report.body.contains("Elapsed: 01:02:05"));
        assert!(!report.body.contains("Statements executed"));
    }

    #[test]
    fn test_verbose_appends_statements() {
        let entries = vec![entry(
            Action::RebuildHeap {
                object: ObjectName::heap("dbo", "Staging"),
                hint: RebuildHint {
                    online: OnlineOption::EngineDefault,
                    max_degree_of_parallelism: None,
                },
            },
            45.0,
            ItemOutcome::Succeeded,
        )];

        let report = builder()
            .with_verbose(true)
            .build(&entries, RunEnding::default(), Utc::now());
        let tail = report.body.split("Statements executed:\n").nth(1).unwrap();
        assert_eq!(tail, "ALTER TABLE [Sales].[dbo].[Staging] REBUILD\n");
    }

    #[test]
    fn test_aborted_report() {
        let reason = PreconditionError::DatabaseNotFound("Sales".into());
        let ending = RunEnding {
            abort: Some(&reason),
            cancelled_remaining: 0,
        };

        let report = builder().build(&[], ending, Utc::now());
        assert!(report.subject.ends_with(": aborted"));
        assert!(report.body.contains("Run aborted: Database not found: Sales"));
        assert!(!report.body.contains("No objects required maintenance"));
    }

    #[test]
    fn test_empty_and_cancelled_reports() {
        let report = builder().build(&[], RunEnding::default(), Utc::now());
        assert!(report.body.contains("No objects required maintenance."));
        assert!(report.subject.ends_with(": succeeded"));

        let ending = RunEnding {
            abort: None,
            cancelled_remaining: 4,
        };
        let report = builder().build(&[], ending, Utc::now());
        assert!(report.body.contains("Run cancelled: 4 candidate(s) not processed."));
        assert!(report.subject.ends_with(": cancelled"));
    }
}
