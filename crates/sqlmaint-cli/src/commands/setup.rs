//! Server setup commands.

use anyhow::Result;
use sqlmaint_core::provisioning::provision_database_mail;
use sqlmaint_core::{Collaborators, Config};
use tracing::info;

/// Enable Database Mail on the configured server.
pub async fn setup_mail(config: Config) -> Result<()> {
    info!(server = %config.server.name, "Provisioning Database Mail");

    println!("Enabling Database Mail...");
    println!("  Server: {}", config.server.name);
    println!("  Execution: {:?}", config.execution.mode);
    println!();

    let collaborators = Collaborators::from_config(&config)?;
    let count = provision_database_mail(collaborators.executor.as_ref())
        .await
        .map_err(sqlmaint_core::Error::from)?;

    println!("Database Mail provisioning completed:");
    println!("  Statements executed: {}", count);

    Ok(())
}
