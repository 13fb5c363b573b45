//! Catalog reader backed by a JSON snapshot.
//!
//! A snapshot captures what the physical-stats and metadata queries would
//! return for one server: its edition and, per database, the compatibility
//! level, index rows, statistics rows and table row counts. Filtering and
//! ordering follow the live reader contract exactly, so the engine cannot tell
//! the difference.

use super::{
    CatalogReader, FragmentationFilter, MaintenanceCandidate, ObjectName, SizeGate,
    StatisticsCandidate,
};
use crate::capability::LobType;
use crate::error::CatalogError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Root of a snapshot file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SnapshotDocument {
    /// `SERVERPROPERTY('Edition')`
    pub edition: String,
    /// Databases on the server
    #[serde(default)]
    pub databases: Vec<DatabaseSnapshot>,
}

/// One database in a snapshot.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseSnapshot {
    pub name: String,
    pub compatibility_level: u16,
    #[serde(default)]
    pub indexes: Vec<IndexRow>,
    #[serde(default)]
    pub statistics: Vec<StatisticsRow>,
    #[serde(default)]
    pub row_counts: Vec<TableRowCount>,
}

/// Physical stats for one index or heap.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexRow {
    pub schema: String,
    pub table: String,
    /// Absent for a heap
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default = "default_page_locks")]
    pub page_locks_enabled: bool,
    pub fragmentation_percent: f64,
    pub page_count: u64,
    /// `(system_type_id, max_length)` of every column in the table
    #[serde(default)]
    pub column_types: Vec<(u8, i32)>,
}

/// Header information for one statistics object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatisticsRow {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rows_at_last_update: u64,
    #[serde(default)]
    pub page_count: Option<u64>,
}

/// Row count of one table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableRowCount {
    pub schema: String,
    pub table: String,
    pub rows: u64,
}

fn default_page_locks() -> bool {
    true
}

/// Catalog reader answering from a loaded [`SnapshotDocument`].
pub struct SnapshotCatalog {
    document: SnapshotDocument,
}

impl SnapshotCatalog {
    /// Wrap an in-memory document.
    pub fn new(document: SnapshotDocument) -> Self {
        Self { document }
    }

    /// Load a snapshot from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CatalogError::SnapshotLoad(format!("{}: {}", path.display(), e))
        })?;
        let document: SnapshotDocument = serde_json::from_str(&content)
            .map_err(|e| CatalogError::SnapshotLoad(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            databases = document.databases.len(),
            "Loaded catalog snapshot"
        );

        Ok(Self::new(document))
    }

    fn database(&self, name: &str) -> Result<&DatabaseSnapshot, CatalogError> {
        self.document
            .databases
            .iter()
            .find(|db| db.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CatalogError::UnknownDatabase(name.to_string()))
    }

    fn lookup_row_count(db: &DatabaseSnapshot, schema: &str, table: &str) -> Option<u64> {
        db.row_counts
            .iter()
            .find(|r| r.schema == schema && r.table == table)
            .map(|r| r.rows)
    }
}

#[async_trait]
impl CatalogReader for SnapshotCatalog {
    async fn list_fragmented_indexes(
        &self,
        database: &str,
        filter: &FragmentationFilter,
        lob_types: &[LobType],
    ) -> Result<Vec<MaintenanceCandidate>, CatalogError> {
        let db = self.database(database)?;

        let mut candidates: Vec<MaintenanceCandidate> = db
            .indexes
            .iter()
            .filter(|row| {
                row.page_count >= filter.min_page_count
                    && row.fragmentation_percent >= filter.min_fragmentation_percent
            })
            .map(|row| MaintenanceCandidate {
                object: ObjectName {
                    schema: row.schema.clone(),
                    table: row.table.clone(),
                    index: row.index.clone(),
                },
                page_locks_enabled: row.page_locks_enabled,
                contains_lob: row.column_types.iter().any(|(type_id, max_length)| {
                    lob_types
                        .iter()
                        .any(|lob| lob.matches_column(*type_id, *max_length))
                }),
                fragmentation_percent: row.fragmentation_percent,
                page_count: row.page_count,
            })
            .collect();

        candidates.sort_by(|a, b| b.fragmentation_percent.total_cmp(&a.fragmentation_percent));

        debug!(
            database,
            candidates = candidates.len(),
            "Listed fragmented indexes from snapshot"
        );

        Ok(candidates)
    }

    async fn list_stale_statistics(
        &self,
        database: &str,
        cutoff: DateTime<Utc>,
        size_gate: &SizeGate,
    ) -> Result<Vec<StatisticsCandidate>, CatalogError> {
        let db = self.database(database)?;

        let mut candidates: Vec<StatisticsCandidate> = db
            .statistics
            .iter()
            .filter(|row| row.last_updated.map_or(true, |ts| ts <= cutoff))
            .filter(|row| match size_gate {
                SizeGate::MinPageCount { minimum } => {
                    row.page_count.map_or(false, |pages| pages >= *minimum)
                }
                SizeGate::MinRowCount { minimum } => {
                    // Unknown counts are resolved by the engine per item.
                    Self::lookup_row_count(db, &row.schema, &row.table)
                        .map_or(true, |rows| rows >= *minimum)
                }
                SizeGate::None => true,
            })
            .map(|row| StatisticsCandidate {
                object: ObjectName {
                    schema: row.schema.clone(),
                    table: row.table.clone(),
                    index: row.name.clone(),
                },
                last_updated: row.last_updated,
                rows_at_last_update: row.rows_at_last_update,
                current_row_count: Self::lookup_row_count(db, &row.schema, &row.table),
                page_count: row.page_count,
            })
            .collect();

        candidates.sort_by_key(|c| c.last_updated);

        Ok(candidates)
    }

    async fn table_row_count(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<u64, CatalogError> {
        let db = self.database(database)?;
        Self::lookup_row_count(db, schema, table)
            .ok_or_else(|| CatalogError::UnknownTable(format!("{}.{}", schema, table)))
    }

    async fn database_exists(&self, name: &str) -> Result<bool, CatalogError> {
        Ok(self.database(name).is_ok())
    }

    async fn compatibility_level(&self, database: &str) -> Result<u16, CatalogError> {
        Ok(self.database(database)?.compatibility_level)
    }

    async fn engine_edition_name(&self) -> Result<String, CatalogError> {
        Ok(self.document.edition.clone())
    }
}
