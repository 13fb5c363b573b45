//! Maintenance statement synthesis.
//!
//! Every identifier goes through [`quote_identifier`] and every string value
//! through [`quote_literal`]. The database name is the only identifier that
//! comes from outside the catalog, so statements can only be built for a
//! [`VerifiedDatabase`], which the runner hands out after an existence check.

use super::classifier::{Action, OnlineOption, RebuildHint};
use crate::catalog::ObjectName;

/// Delimit an identifier with brackets, doubling any closing bracket.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Unicode string literal, doubling any single quote.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Database name confirmed to exist on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDatabase(String);

impl VerifiedDatabase {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Builds statement text for actions against one database.
pub struct CommandSynthesizer {
    database: VerifiedDatabase,
    statistics_after_reorganize: bool,
}

impl CommandSynthesizer {
    /// Create a synthesizer for a verified database.
    pub fn new(database: VerifiedDatabase) -> Self {
        Self {
            database,
            statistics_after_reorganize: false,
        }
    }

    /// Follow each reorganize with a full-scan statistics update.
    pub fn with_statistics_after_reorganize(mut self, enabled: bool) -> Self {
        self.statistics_after_reorganize = enabled;
        self
    }

    /// Statements for an action, in execution order. Skips produce none.
    pub fn statements(&self, action: &Action) -> Vec<String> {
        match action {
            Action::Skip { .. } => Vec::new(),
            Action::ReorganizeIndex { object } => {
                let mut statements = vec![format!(
                    "ALTER INDEX {} ON {} REORGANIZE",
                    self.index_name(object),
                    self.table_name(object)
                )];
                if self.statistics_after_reorganize {
                    statements.push(self.update_statistics(object));
                }
                statements
            }
            Action::RebuildIndexOnline { object, hint }
            | Action::RebuildIndexOffline { object, hint } => vec![format!(
                "ALTER INDEX {} ON {} REBUILD{}",
                self.index_name(object),
                self.table_name(object),
                with_clause(hint)
            )],
            Action::RebuildHeap { object, hint } => vec![format!(
                "ALTER TABLE {} REBUILD{}",
                self.table_name(object),
                with_clause(hint)
            )],
            Action::UpdateStatisticsFullScan { object } => vec![self.update_statistics(object)],
        }
    }

    fn table_name(&self, object: &ObjectName) -> String {
        format!(
            "{}.{}.{}",
            quote_identifier(self.database.name()),
            quote_identifier(&object.schema),
            quote_identifier(&object.table)
        )
    }

    fn index_name(&self, object: &ObjectName) -> String {
        object
            .index
            .as_deref()
            .map(quote_identifier)
            .unwrap_or_else(|| "ALL".to_string())
    }

    fn update_statistics(&self, object: &ObjectName) -> String {
        match &object.index {
            Some(name) => format!(
                "UPDATE STATISTICS {} {} WITH FULLSCAN",
                self.table_name(object),
                quote_identifier(name)
            ),
            None => format!("UPDATE STATISTICS {} WITH FULLSCAN", self.table_name(object)),
        }
    }
}

fn with_clause(hint: &RebuildHint) -> String {
    let mut options = Vec::new();
    match hint.online {
        OnlineOption::Online => options.push("ONLINE = ON".to_string()),
        OnlineOption::Offline => options.push("ONLINE = OFF".to_string()),
        OnlineOption::EngineDefault => {}
    }
    if let Some(dop) = hint.max_degree_of_parallelism {
        options.push(format!("MAXDOP = {}", dop));
    }

    if options.is_empty() {
        String::new()
    } else {
        format!(" WITH ({})", options.join(", "))
    }
}
