//! Index and statistics maintenance.
//!
//! This module provides the maintenance decision engine:
//! - **Classification**: pick reorganize, rebuild or skip for each index
//! - **Staleness**: decide which statistics need a full-scan update
//! - **Commands**: render actions as quoted T-SQL
//! - **Execution**: run candidates one at a time, isolating failures
//! - **Reporting**: summarize every run for the operator
//! - **Scheduling**: run both passes periodically

mod classifier;
mod command;
mod log;
mod report;
mod runner;
mod scheduler;
mod staleness;

pub use classifier::{
    Action, IndexClassifier, OnlineOption, RebuildHint, RebuildMode, SkipReason, Thresholds,
};
pub use command::{quote_identifier, quote_literal, CommandSynthesizer, VerifiedDatabase};
pub use log::{EntrySubject, ItemOutcome, ItemState, MaintenanceLogEntry, WorkItem};
pub use report::{describe_entry, Report, ReportBuilder, RunEnding, RunKind};
pub use runner::{
    IndexRunOptions, MaintenanceRunner, RunSettings, RunSummary, StatisticsRunOptions,
};
pub use scheduler::{MaintenanceScheduler, TaskInfo, TaskStatus, INDEX_TASK, STATISTICS_TASK};
pub use staleness::{
    classify_statistics, is_outdated, order_by_staleness, size_gate_satisfied, staleness_cutoff,
    Staleness,
};
