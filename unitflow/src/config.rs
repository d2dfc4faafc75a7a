//! Worker configuration.
//!
//! Loaded once at startup from a TOML file. Units only ever see it
//! read-only; scripts see it as the `cfg` global.

use crate::context::Context;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database kind served by the bundled SQLite facade.
pub const SQLITE: &str = "sqlite";

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Default tracing level; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// SMTP settings used by the Mail unit.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// HTTP client settings used by the Http unit.
    #[serde(default)]
    pub http: HttpConfig,
    /// Free-form settings visible to scripts.
    #[serde(default)]
    pub settings: toml::Table,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            smtp: None,
            http: HttpConfig::default(),
            settings: toml::Table::new(),
        }
    }
}

impl WorkerConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the file cannot be read, does not
    /// parse, or lacks required settings.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for invalid TOML or missing settings.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings the worker cannot start without.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.database.kind.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting("database.kind".into()));
        }
        if !self.database.kind.trim().eq_ignore_ascii_case(SQLITE) {
            return Err(ConfigurationError::invalid_setting(
                "database.kind",
                format!("unsupported database kind '{}'", self.database.kind),
            ));
        }
        if self.database.connection_string.trim().is_empty() {
            return Err(ConfigurationError::MissingSetting(
                "database.connection_string".into(),
            ));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigurationError::invalid_setting(
                "scheduler.interval_secs",
                "must be greater than zero",
            ));
        }
        if let Some(smtp) = &self.smtp {
            if smtp.host.trim().is_empty() {
                return Err(ConfigurationError::MissingSetting("smtp.host".into()));
            }
        }
        Ok(())
    }

    /// Returns the configuration as a context, as seen by scripts.
    ///
    /// Secrets are not serialized.
    #[must_use]
    pub fn to_context(&self) -> Context {
        serde_json::to_value(self)
            .ok()
            .and_then(|json| Context::from_json(json).ok())
            .unwrap_or_default()
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database kind, e.g. `sqlite`.
    #[serde(default)]
    pub kind: String,
    /// Driver-specific connection string (a file path for SQLite).
    #[serde(default)]
    pub connection_string: String,
    /// Directory holding named queries as `<name>.sql` files.
    #[serde(default)]
    pub query_dir: Option<PathBuf>,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_jobs_path() -> PathBuf {
    PathBuf::from("jobs.xml")
}

fn default_reload_each_tick() -> bool {
    true
}

/// Batch scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause between the end of one batch and the start of the next.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Job definition file.
    #[serde(default = "default_jobs_path")]
    pub jobs_path: PathBuf,
    /// Reload the job file (and discard unit state) before every batch.
    #[serde(default = "default_reload_each_tick")]
    pub reload_each_tick: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            jobs_path: default_jobs_path(),
            reload_each_tick: default_reload_each_tick(),
        }
    }
}

impl SchedulerConfig {
    /// Gets the interval as a Duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_smtp_port() -> u16 {
    25
}

/// SMTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Login user; credentials are only sent when set.
    #[serde(default)]
    pub user: Option<String>,
    /// Login password.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Default sender address.
    #[serde(default)]
    pub from: Option<String>,
    /// Upgrade the connection with STARTTLS.
    #[serde(default)]
    pub starttls: bool,
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("unitflow/", env!("CARGO_PKG_VERSION")).to_string()
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Gets timeout as Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
