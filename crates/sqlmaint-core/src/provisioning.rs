//! One-time server setup for Database Mail delivery.
//!
//! Kept apart from the maintenance passes: a run never changes server
//! configuration.

use crate::error::ExecutionError;
use crate::executor::StatementExecutor;
use tracing::info;

const MAIL_XPS_ENABLED: &str =
    "SELECT 1 FROM sys.configurations WHERE name = N'Database Mail XPs' AND value_in_use = 1";

/// Statements that enable Database Mail. Each is a no-op once the feature is on.
pub fn database_mail_setup_statements() -> Vec<String> {
    [
        "EXEC sp_configure N'show advanced options', 1",
        "RECONFIGURE",
        "EXEC sp_configure N'Database Mail XPs', 1",
        "RECONFIGURE",
    ]
    .iter()
    .map(|step| format!("IF NOT EXISTS ({}) BEGIN {}; END", MAIL_XPS_ENABLED, step))
    .collect()
}

/// Enable Database Mail through `executor`. Stops at the first failure.
pub async fn provision_database_mail(
    executor: &dyn StatementExecutor,
) -> Result<usize, ExecutionError> {
    let statements = database_mail_setup_statements();
    for statement in &statements {
        executor.execute(statement).await?;
    }

    info!(statements = statements.len(), "Database Mail provisioning complete");
    Ok(statements.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DryRunExecutor;
    use async_trait::async_trait;

    struct RejectingExecutor;

    #[async_trait]
    impl StatementExecutor for RejectingExecutor {
        async fn execute(&self, _statement: &str) -> Result<(), ExecutionError> {
            Err(ExecutionError::Engine(
                "User does not have permission to perform this action.".into(),
            ))
        }
    }

    #[test]
    fn test_statements_are_guarded() {
        let statements = database_mail_setup_statements();
        assert_eq!(statements.len(), 4);
        assert!(statements
            .iter()
            .all(|s| s.starts_with("IF NOT EXISTS (SELECT 1 FROM sys.configurations")));
        assert!(statements[2].contains("sp_configure N'Database Mail XPs', 1"));
    }

    #[tokio::test]
    async fn test_provision_runs_every_statement() {
        let executor = DryRunExecutor::new();
        let count = provision_database_mail(&executor).await.unwrap();

        assert_eq!(count, 4);
        assert_eq!(executor.statements(), database_mail_setup_statements());
    }

    #[tokio::test]
    async fn test_provision_propagates_failure() {
        let err = provision_database_mail(&RejectingExecutor).await.unwrap_err();
        assert!(err.to_string().contains("permission"));
    }
}
