//! Per-object run log.
//!
//! Each candidate moves through `Pending -> Executing -> {Succeeded, Failed}`,
//! or straight from `Pending` to `Skipped`. Terminal states are final.

use super::classifier::{Action, SkipReason};
use crate::catalog::ObjectName;
use chrono::{DateTime, Utc};

/// Processing state of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemState {
    Pending,
    Executing,
    Succeeded,
    Failed(String),
    Skipped(SkipReason),
}

impl ItemState {
    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Succeeded | ItemState::Failed(_) | ItemState::Skipped(_)
        )
    }

    fn can_enter(&self, next: &ItemState) -> bool {
        matches!(
            (self, next),
            (ItemState::Pending, ItemState::Executing)
                | (ItemState::Pending, ItemState::Skipped(_))
                | (ItemState::Executing, ItemState::Succeeded)
                | (ItemState::Executing, ItemState::Failed(_))
        )
    }
}

/// What the catalog said about the object when it was picked.
#[derive(Debug, Clone, PartialEq)]
pub enum EntrySubject {
    /// Index or heap with its measured fragmentation
    Index { fragmentation_percent: f64 },
    /// Statistics object with its last update time
    Statistics { last_updated: Option<DateTime<Utc>> },
}

/// Final outcome of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Succeeded,
    Failed(String),
    Skipped(SkipReason),
}

/// One processed candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceLogEntry {
    pub object: ObjectName,
    pub subject: EntrySubject,
    pub action: Action,
    pub outcome: ItemOutcome,
    /// Statements sent to the executor, in order
    pub statements: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A candidate being processed by the execution loop.
#[derive(Debug)]
pub struct WorkItem {
    object: ObjectName,
    subject: EntrySubject,
    action: Action,
    state: ItemState,
    statements: Vec<String>,
    started_at: DateTime<Utc>,
}

impl WorkItem {
    /// A pending item.
    pub fn new(subject: EntrySubject, action: Action) -> Self {
        Self {
            object: action.object().clone(),
            subject,
            action,
            state: ItemState::Pending,
            statements: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &ItemState {
        &self.state
    }

    /// Chosen action.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Move to `next` if the transition is allowed. Returns whether it moved.
    pub fn transition(&mut self, next: ItemState) -> bool {
        if !self.state.can_enter(&next) {
            return false;
        }
        if next == ItemState::Executing {
            self.started_at = Utc::now();
        }
        self.state = next;
        true
    }

    /// Record a statement handed to the executor.
    pub fn record_statement(&mut self, statement: &str) {
        self.statements.push(statement.to_string());
    }

    /// Close the item into a log entry. Non-terminal items are reported as
    /// failed.
    pub fn finish(self) -> MaintenanceLogEntry {
        let outcome = match self.state {
            ItemState::Succeeded => ItemOutcome::Succeeded,
            ItemState::Failed(message) => ItemOutcome::Failed(message),
            ItemState::Skipped(reason) => ItemOutcome::Skipped(reason),
            ItemState::Pending | ItemState::Executing => {
                ItemOutcome::Failed("processing did not complete".to_string())
            }
        };

        MaintenanceLogEntry {
            object: self.object,
            subject: self.subject,
            action: self.action,
            outcome,
            statements: self.statements,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::new(
            EntrySubject::Index {
                fragmentation_percent: 12.0,
            },
            Action::ReorganizeIndex {
                object: ObjectName::index("dbo", "Orders", "IX_A"),
            },
        )
    }

    #[test]
    fn test_success_path() {
        let mut item = item();
        assert_eq!(item.state(), &ItemState::Pending);
        assert!(item.transition(ItemState::Executing));
        assert!(item.transition(ItemState::Succeeded));

        let entry = item.finish();
        assert_eq!(entry.outcome, ItemOutcome::Succeeded);
        assert!(entry.finished_at >= entry.started_at);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut item = item();
        item.transition(ItemState::Executing);
        item.transition(ItemState::Failed("deadlock".into()));

        assert!(!item.transition(ItemState::Pending));
        assert!(!item.transition(ItemState::Executing));
        assert!(!item.transition(ItemState::Succeeded));
        assert_eq!(item.finish().outcome, ItemOutcome::Failed("deadlock".into()));
    }

    #[test]
    fn test_skip_bypasses_executing() {
        let mut skipped = item();
        assert!(skipped.transition(ItemState::Skipped(SkipReason::PageLocksDisabled)));
        assert!(skipped.state().is_terminal());
        assert!(!skipped.transition(ItemState::Executing));

        let mut executing = item();
        executing.transition(ItemState::Executing);
        assert!(!executing.transition(ItemState::Skipped(SkipReason::BelowThreshold)));
    }

    #[test]
    fn test_unfinished_item_reports_failure() {
        let mut item = item();
        item.transition(ItemState::Executing);
        assert!(matches!(item.finish().outcome, ItemOutcome::Failed(_)));
    }
}
