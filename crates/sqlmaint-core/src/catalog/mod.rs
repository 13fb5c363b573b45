//! Catalog introspection boundary.
//!
//! The maintenance engine never queries the server directly. It consumes the
//! rows produced by a [`CatalogReader`]:
//!
//! - **Fragmented indexes**: ordered by descending fragmentation
//! - **Stale statistics**: ordered by ascending last-updated time, never
//!   updated first
//! - **Environment facts**: database existence, compatibility level, edition
//!
//! [`SnapshotCatalog`] answers the same contract from a JSON snapshot.

mod snapshot;

pub use snapshot::{
    DatabaseSnapshot, IndexRow, SnapshotCatalog, SnapshotDocument, StatisticsRow, TableRowCount,
};

use crate::capability::LobType;
use crate::error::CatalogError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a maintenance target. A missing index name denotes a heap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectName {
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
    /// Index or statistics name, `None` for a heap
    pub index: Option<String>,
}

impl ObjectName {
    /// Name an index (or statistics object) on a table.
    pub fn index(
        schema: impl Into<String>,
        table: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            index: Some(index.into()),
        }
    }

    /// Name a heap.
    pub fn heap(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            index: None,
        }
    }

    /// Whether this names a heap.
    pub fn is_heap(&self) -> bool {
        self.index.is_none()
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.index {
            Some(index) => write!(f, "{}.{}.{}", self.schema, self.table, index),
            None => write!(f, "{}.{}", self.schema, self.table),
        }
    }
}

/// A fragmented index or heap, measured once when the catalog was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceCandidate {
    /// Target identity
    pub object: ObjectName,
    /// `ALLOW_PAGE_LOCKS` is on
    pub page_locks_enabled: bool,
    /// Table has at least one large-object column
    pub contains_lob: bool,
    /// `avg_fragmentation_in_percent` at read time
    pub fragmentation_percent: f64,
    /// Page count at read time
    #[serde(default)]
    pub page_count: u64,
}

/// A statistics object whose freshness is evaluated against a cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsCandidate {
    /// Target identity
    pub object: ObjectName,
    /// Last update time, `None` if never updated
    pub last_updated: Option<DateTime<Utc>>,
    /// Row count sampled at the last update
    pub rows_at_last_update: u64,
    /// Current table row count, if the reader supplied it
    pub current_row_count: Option<u64>,
    /// Page count of the underlying index, if known
    pub page_count: Option<u64>,
}

/// Minimum-size gate applied to statistics candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeGate {
    /// No gate
    None,
    /// Current table row count must reach the minimum
    MinRowCount { minimum: u64 },
    /// Index page count must reach the minimum
    MinPageCount { minimum: u64 },
}

impl Default for SizeGate {
    fn default() -> Self {
        SizeGate::MinPageCount { minimum: 1000 }
    }
}

/// Filter passed to the fragmented-index query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentationFilter {
    /// Minimum page count
    pub min_page_count: u64,
    /// Minimum fragmentation percent
    pub min_fragmentation_percent: f64,
}

/// Read access to the server catalog.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Indexes and heaps at or above the filter, most fragmented first. The
    /// `lob_types` decide each candidate's `contains_lob` flag.
    async fn list_fragmented_indexes(
        &self,
        database: &str,
        filter: &FragmentationFilter,
        lob_types: &[LobType],
    ) -> Result<Vec<MaintenanceCandidate>, CatalogError>;

    /// Statistics last updated at or before `cutoff` (or never), oldest first.
    async fn list_stale_statistics(
        &self,
        database: &str,
        cutoff: DateTime<Utc>,
        size_gate: &SizeGate,
    ) -> Result<Vec<StatisticsCandidate>, CatalogError>;

    /// Current row count of one table.
    async fn table_row_count(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<u64, CatalogError>;

    /// Whether the database exists on the server.
    async fn database_exists(&self, name: &str) -> Result<bool, CatalogError>;

    /// Compatibility level of the database.
    async fn compatibility_level(&self, database: &str) -> Result<u16, CatalogError>;

    /// Edition name as reported by `SERVERPROPERTY('Edition')`.
    async fn engine_edition_name(&self) -> Result<String, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_display() {
        assert_eq!(
            ObjectName::index("dbo", "Orders", "IX_Orders_Date").to_string(),
            "dbo.Orders.IX_Orders_Date"
        );
        let heap = ObjectName::heap("dbo", "Staging");
        assert!(heap.is_heap());
        assert_eq!(heap.to_string(), "dbo.Staging");
    }

    #[test]
    fn test_size_gate_serde() {
        let gate: SizeGate = serde_json::from_str(r#"{"kind":"min_row_count","minimum":500}"#)
            .unwrap();
        assert_eq!(gate, SizeGate::MinRowCount { minimum: 500 });
        assert_eq!(SizeGate::default(), SizeGate::MinPageCount { minimum: 1000 });
    }
}
