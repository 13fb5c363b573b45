//! Configuration structures for sqlmaint.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use crate::catalog::SizeGate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server identity
    pub server: ServerConfig,

    /// Target database
    pub database: DatabaseConfig,

    /// Index maintenance configuration
    #[serde(default)]
    pub index: IndexMaintenanceConfig,

    /// Statistics maintenance configuration
    #[serde(default)]
    pub statistics: StatisticsMaintenanceConfig,

    /// Report delivery configuration
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Statement execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Catalog source configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Append every synthesized statement to the report
    #[serde(default)]
    pub verbose: bool,
}

/// Server identity, used in report headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server name
    pub name: String,
}

/// Target database.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database name (checked against the catalog before every run)
    pub name: String,
}

/// Index maintenance thresholds and rebuild behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexMaintenanceConfig {
    /// Rebuild mode: online_only, offline_only or mixed
    ///
    /// Kept as a string so that an invalid value aborts the run with a report
    /// instead of failing config loading.
    #[serde(default = "default_rebuild_mode")]
    pub rebuild_mode: String,

    /// Indexes smaller than this are ignored
    #[serde(default = "default_min_page_count")]
    pub min_page_count: u64,

    /// Fragmentation at which an index is reorganized
    #[serde(default = "default_reorganize_threshold")]
    pub reorganize_threshold_percent: f64,

    /// Fragmentation at which an index or heap is rebuilt
    #[serde(default = "default_rebuild_threshold")]
    pub rebuild_threshold_percent: f64,

    /// MAXDOP hint for rebuilds
    #[serde(default)]
    pub max_parallelism: Option<u16>,

    /// Follow each reorganize with a full-scan statistics update
    #[serde(default = "default_enabled")]
    pub update_statistics_after_reorganize: bool,
}

impl Default for IndexMaintenanceConfig {
    fn default() -> Self {
        Self {
            rebuild_mode: default_rebuild_mode(),
            min_page_count: default_min_page_count(),
            reorganize_threshold_percent: default_reorganize_threshold(),
            rebuild_threshold_percent: default_rebuild_threshold(),
            max_parallelism: None,
            update_statistics_after_reorganize: default_enabled(),
        }
    }
}

/// Statistics staleness configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatisticsMaintenanceConfig {
    /// Statistics older than this many days are updated
    #[serde(default = "default_days_since_update")]
    pub days_since_update: u32,

    /// Minimum object size
    #[serde(default)]
    pub size_gate: SizeGate,
}

impl Default for StatisticsMaintenanceConfig {
    fn default() -> Self {
        Self {
            days_since_update: default_days_since_update(),
            size_gate: SizeGate::default(),
        }
    }
}

/// Report delivery channel.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Print the report to standard output
    #[default]
    Stdout,
    /// Write the report to a file
    File,
    /// Send through Database Mail
    DatabaseMail,
}

/// Report delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Delivery channel
    #[serde(default)]
    pub channel: NotificationChannel,

    /// Semicolon-delimited recipient list
    #[serde(default)]
    pub recipients: String,

    /// Subject prefix
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Output directory (file channel)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Database Mail profile (database_mail channel)
    #[serde(default)]
    pub mail_profile: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: NotificationChannel::default(),
            recipients: String::new(),
            subject_prefix: default_subject_prefix(),
            output_dir: default_output_dir(),
            mail_profile: None,
        }
    }
}

/// How statements reach the server.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Record statements without running them
    #[default]
    DryRun,
    /// Append statements to a T-SQL script
    Script,
}

/// Statement execution configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Execution mode
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Script path (script mode)
    #[serde(default)]
    pub script_path: Option<PathBuf>,
}

/// Catalog source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// JSON catalog snapshot
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Enable the scheduled index pass
    #[serde(default = "default_enabled")]
    pub index_enabled: bool,

    /// Index pass interval in seconds
    #[serde(default = "default_daily_interval")]
    pub index_interval_seconds: u64,

    /// Enable the scheduled statistics pass
    #[serde(default = "default_enabled")]
    pub statistics_enabled: bool,

    /// Statistics pass interval in seconds
    #[serde(default = "default_daily_interval")]
    pub statistics_interval_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            index_enabled: default_enabled(),
            index_interval_seconds: default_daily_interval(),
            statistics_enabled: default_enabled(),
            statistics_interval_seconds: default_daily_interval(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_rebuild_mode() -> String {
    "mixed".to_string()
}
fn default_min_page_count() -> u64 {
    1000
}
fn default_reorganize_threshold() -> f64 {
    5.0
}
fn default_rebuild_threshold() -> f64 {
    30.0
}
fn default_days_since_update() -> u32 {
    30
}
fn default_enabled() -> bool {
    true
}
fn default_subject_prefix() -> String {
    "[sqlmaint]".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./catalog.json")
}
fn default_daily_interval() -> u64 {
    86400
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.name.trim().is_empty() {
            return Err(crate::Error::Config("Server name is required".into()));
        }

        if self.database.name.trim().is_empty() {
            return Err(crate::Error::Config("Database name is required".into()));
        }

        let reorganize = self.index.reorganize_threshold_percent;
        let rebuild = self.index.rebuild_threshold_percent;
        for (name, value) in [("reorganize", reorganize), ("rebuild", rebuild)] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(crate::Error::Config(format!(
                    "Index {} threshold must be in (0, 100], got {}",
                    name, value
                )));
            }
        }
        if reorganize >= rebuild {
            return Err(crate::Error::Config(format!(
                "Reorganize threshold ({}) must be below rebuild threshold ({})",
                reorganize, rebuild
            )));
        }

        if self.index.max_parallelism == Some(0) {
            return Err(crate::Error::Config(
                "max_parallelism must be at least 1 when set".into(),
            ));
        }

        if self.statistics.days_since_update == 0 {
            return Err(crate::Error::Config(
                "Statistics days_since_update must be at least 1".into(),
            ));
        }

        if self.notification.channel == NotificationChannel::DatabaseMail
            && self.notification.recipients.trim().is_empty()
        {
            return Err(crate::Error::Config(
                "Database mail delivery requires recipients".into(),
            ));
        }

        if self.execution.mode == ExecutionMode::Script && self.execution.script_path.is_none() {
            return Err(crate::Error::Config(
                "Script execution mode requires script_path".into(),
            ));
        }

        if self.schedule.index_interval_seconds == 0 || self.schedule.statistics_interval_seconds == 0
        {
            tracing::warn!("Zero schedule interval; scheduler will treat it as one second");
        }

        Ok(())
    }
}
