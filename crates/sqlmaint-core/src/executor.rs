//! Statement execution channel.
//!
//! Each maintenance statement is sent on its own and commits or fails on its
//! own. Executors never retry.

use crate::error::ExecutionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Runs one statement against the server.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Execute a single statement, returning the engine error text on failure.
    async fn execute(&self, statement: &str) -> Result<(), ExecutionError>;
}

/// Executor that only records what it was asked to run.
#[derive(Default)]
pub struct DryRunExecutor {
    statements: Mutex<Vec<String>>,
}

impl DryRunExecutor {
    /// Create an empty dry-run executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }
}

#[async_trait]
impl StatementExecutor for DryRunExecutor {
    async fn execute(&self, statement: &str) -> Result<(), ExecutionError> {
        debug!(statement, "Dry run");
        self.statements.lock().push(statement.to_string());
        Ok(())
    }
}

/// Executor that appends statements to a T-SQL script, one batch each.
pub struct ScriptExecutor {
    path: PathBuf,
    file: Mutex<File>,
}

impl ScriptExecutor {
    /// Open (or create) the script file for appending.
    pub fn open(path: &Path) -> Result<Self, ExecutionError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ExecutionError::Unavailable(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Writing maintenance script");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Script path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StatementExecutor for ScriptExecutor {
    async fn execute(&self, statement: &str) -> Result<(), ExecutionError> {
        let mut file = self.file.lock();
        writeln!(file, "{};\nGO", statement)
            .and_then(|_| file.flush())
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))
    }
}
