//! Error types for sqlmaint core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Run-level fatal conditions live in [`PreconditionError`]; per-object
//! failures never surface as `Err` from a maintenance run, they are recorded
//! in the run log instead.

use thiserror::Error;

/// Result type alias for sqlmaint operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for sqlmaint.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog-related error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Statement execution error
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notification(#[from] NotifyError),

    /// Fatal run precondition
    #[error("{0}")]
    Precondition(#[from] PreconditionError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Conditions that abort a whole maintenance run before any candidate is
/// touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreconditionError {
    /// The target database does not exist on the server
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// The rebuild-mode parameter is not one of the accepted values
    #[error("Invalid rebuild mode: '{0}' (expected online_only, offline_only or mixed)")]
    InvalidRebuildMode(String),

    /// Online-only rebuilds were requested on an edition that cannot do them
    #[error("Online rebuild requested but not supported by edition: {edition}")]
    OnlineRebuildUnsupported { edition: String },

    /// The database compatibility level has no known large-object type set
    #[error("Unsupported database compatibility mode: {0}")]
    UnsupportedCompatibilityLevel(u16),

    /// The initial catalog query failed
    #[error("Catalog query failed: {0}")]
    CatalogQuery(String),
}

/// Catalog-specific errors.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    /// Snapshot document could not be loaded
    #[error("Snapshot load failed: {0}")]
    SnapshotLoad(String),

    /// Database is unknown to the catalog
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    /// Table is unknown to the catalog
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Query failed on the server
    #[error("Query failed: {0}")]
    Query(String),
}

/// Errors reported by a statement executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// The engine rejected or failed the statement
    #[error("{0}")]
    Engine(String),

    /// The executor could not deliver the statement
    #[error("Executor unavailable: {0}")]
    Unavailable(String),
}

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// No recipients configured
    #[error("No recipients configured")]
    NoRecipients,

    /// Delivery failed
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
