//! sqlmaint Core - SQL Server index and statistics maintenance engine
//!
//! This library decides, for every index and statistics object of a database,
//! whether it needs maintenance, renders the matching T-SQL, runs it one object
//! at a time and reports the outcome:
//!
//! - Capability detection from edition and compatibility level
//! - Fragmentation-driven reorganize / rebuild / skip classification
//! - Age- and size-gated statistics refresh
//! - Per-object fault isolation with a guaranteed end-of-run report

pub mod capability;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod executor;
pub mod maintenance;
pub mod notify;
pub mod provisioning;

// Re-export commonly used types
pub use collaborators::Collaborators;
pub use config::Config;
pub use error::{CatalogError, ExecutionError, NotifyError, PreconditionError};
pub use error::{Error, Result};
