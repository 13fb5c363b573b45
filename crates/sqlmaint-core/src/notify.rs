//! Report delivery.
//!
//! Delivery channels:
//! - **Stdout**: print the report
//! - **File**: write one text file per report
//! - **Database Mail**: `msdb.dbo.sp_send_dbmail` through a statement executor

use crate::error::NotifyError;
use crate::executor::StatementExecutor;
use crate::maintenance::quote_literal;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Sends a finished report somewhere a human will read it.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a report. `recipients` is a semicolon-delimited list.
    async fn send(&self, recipients: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Split a semicolon-delimited address list, dropping blanks.
pub fn parse_recipients(recipients: &str) -> Vec<String> {
    recipients
        .split(';')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}

/// Prints reports to standard output.
#[derive(Debug, Default)]
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, recipients: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if !recipients.trim().is_empty() {
            println!("To: {}", parse_recipients(recipients).join("; "));
        }
        println!("Subject: {}\n", subject);
        println!("{}", body);
        Ok(())
    }
}

/// Writes each report to its own file.
#[derive(Debug)]
pub struct FileNotifier {
    output_dir: PathBuf,
}

impl FileNotifier {
    /// Write reports under `output_dir`, creating it on first use.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn file_name(subject: &str) -> String {
        let mut slug: String = subject
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        while slug.contains("--") {
            slug = slug.replace("--", "-");
        }
        let slug = slug.trim_matches('-');

        format!("{}-{}.txt", slug, Utc::now().format("%Y%m%dT%H%M%S%.3f"))
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    async fn send(&self, recipients: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| NotifyError::Delivery(format!("{}: {}", self.output_dir.display(), e)))?;

        let path = self.output_dir.join(Self::file_name(subject));
        let content = format!(
            "To: {}\nSubject: {}\n\n{}",
            parse_recipients(recipients).join("; "),
            subject,
            body
        );
        std::fs::write(&path, content)
            .map_err(|e| NotifyError::Delivery(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Report written");
        Ok(())
    }
}

/// Sends reports through Database Mail.
pub struct DatabaseMailNotifier {
    executor: Arc<dyn StatementExecutor>,
    profile: Option<String>,
}

impl DatabaseMailNotifier {
    /// Send through `executor`, optionally with a named mail profile.
    pub fn new(executor: Arc<dyn StatementExecutor>, profile: Option<String>) -> Self {
        Self { executor, profile }
    }

    /// The `sp_send_dbmail` call for one report.
    pub fn send_statement(&self, recipients: &[String], subject: &str, body: &str) -> String {
        let mut args = Vec::new();
        if let Some(profile) = &self.profile {
            args.push(format!("@profile_name = {}", quote_literal(profile)));
        }
        args.push(format!("@recipients = {}", quote_literal(&recipients.join(";"))));
        args.push(format!("@subject = {}", quote_literal(subject)));
        args.push(format!("@body = {}", quote_literal(body)));

        format!("EXEC msdb.dbo.sp_send_dbmail {}", args.join(", "))
    }
}

#[async_trait]
impl Notifier for DatabaseMailNotifier {
    async fn send(&self, recipients: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let recipients = parse_recipients(recipients);
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        debug!(recipients = recipients.len(), subject, "Sending report via Database Mail");

        self.executor
            .execute(&self.send_statement(&recipients, subject, body))
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}
