//! Error types for the unitflow engine.
//!
//! The taxonomy follows the recovery boundaries of a batch run:
//! configuration problems are fatal, unit failures abort one job,
//! transaction failures roll back the whole batch.

use std::path::PathBuf;
use thiserror::Error;

/// The umbrella error type for unitflow operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Malformed job source or missing required settings.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A pipeline aborted while running a job.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// The shared batch transaction could not be opened or committed.
    #[error("{0}")]
    BatchTransaction(#[from] BatchTransactionError),
}

/// Error raised while loading configuration or job definitions.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A file could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML configuration did not parse.
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// The job source is malformed.
    #[error("Malformed job source: {0}")]
    JobSource(String),

    /// A required setting is absent.
    #[error("Missing required setting '{0}'")]
    MissingSetting(String),

    /// A setting has an unusable value.
    #[error("Invalid setting '{key}': {message}")]
    InvalidSetting {
        /// The setting key.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigurationError {
    /// Creates a job source error.
    #[must_use]
    pub fn job_source(message: impl Into<String>) -> Self {
        Self::JobSource(message.into())
    }

    /// Creates an invalid setting error.
    #[must_use]
    pub fn invalid_setting(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the database facade.
#[derive(Debug, Error)]
pub enum DbError {
    /// The SQLite driver failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A named query was not found in the query store.
    #[error("Query '{0}' not found in the query store")]
    QueryNotFound(String),

    /// Reading a query file failed.
    #[error("Cannot read query file {path}: {source}")]
    QueryFile {
        /// The query file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A transaction operation was invalid in the current state.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A failure raised by a non-SQLite facade.
    #[error("Database error: {0}")]
    Backend(String),
}

/// Error raised by the script engine. Compile and runtime failures
/// share this single opaque kind.
#[derive(Debug, Clone, Error)]
#[error("Script error: {message}")]
pub struct ScriptError {
    /// Human-readable description.
    pub message: String,
}

impl ScriptError {
    /// Creates a compile-time error.
    #[must_use]
    pub fn compile(message: impl Into<String>) -> Self {
        Self {
            message: format!("compile: {}", message.into()),
        }
    }

    /// Creates a runtime error.
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            message: format!("runtime: {}", message.into()),
        }
    }
}

/// Error raised by the template renderer.
#[derive(Debug, Clone, Error)]
#[error("Template error: {0}")]
pub struct TemplateError(pub String);

/// Error raised while composing or sending an email.
#[derive(Debug, Error)]
pub enum MailError {
    /// No SMTP host is configured.
    #[error("SMTP is not configured")]
    NotConfigured,

    /// The message could not be composed.
    #[error("Invalid message: {0}")]
    Compose(String),

    /// The SMTP transport failed.
    #[error("SMTP send failed: {0}")]
    Transport(String),
}

/// Failure raised while a unit executes.
#[derive(Debug, Error)]
pub enum UnitError {
    /// The database facade failed.
    #[error("{0}")]
    Database(#[from] DbError),

    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A file operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON did not parse or did not have the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML did not parse.
    #[error("XML error: {0}")]
    Xml(String),

    /// A CSV write failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A script failed to compile or run.
    #[error("{0}")]
    Script(#[from] ScriptError),

    /// A required unit attribute is missing or invalid.
    #[error("Invalid unit configuration: {0}")]
    InvalidConfig(String),

    /// A value had the wrong shape for the unit.
    #[error("Unexpected data: {0}")]
    Shape(String),
}

impl UnitError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates a shape error.
    #[must_use]
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }
}

/// Error that aborts a job's pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A unit declaration names an unregistered type.
    #[error("Job '{job}': unknown unit type '{unit_type}'")]
    UnknownUnitType {
        /// The job id.
        job: String,
        /// The declared type name.
        unit_type: String,
    },

    /// A unit raised an error while executing.
    #[error("Job '{job}': unit '{unit}' failed: {source}")]
    UnitExecution {
        /// The job id.
        job: String,
        /// The unit label.
        unit: String,
        /// The wrapped failure.
        #[source]
        source: UnitError,
    },
}

impl PipelineError {
    /// Returns the id of the job that failed.
    #[must_use]
    pub fn job(&self) -> &str {
        match self {
            Self::UnknownUnitType { job, .. } | Self::UnitExecution { job, .. } => job,
        }
    }
}

/// Phase of the batch transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// Opening the database connection.
    Open,
    /// Beginning the transaction.
    Begin,
    /// Committing the transaction.
    Commit,
}

impl std::fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Error raised when the shared batch transaction fails.
#[derive(Debug, Error)]
#[error("Batch transaction failed during {phase}: {source}")]
pub struct BatchTransactionError {
    /// Where the failure happened.
    pub phase: TransactionPhase,
    /// The database failure.
    #[source]
    pub source: DbError,
}

impl BatchTransactionError {
    /// Creates a new batch transaction error.
    #[must_use]
    pub fn new(phase: TransactionPhase, source: DbError) -> Self {
        Self { phase, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_execution_error_mentions_job_and_unit() {
        let err = PipelineError::UnitExecution {
            job: "nightly".to_string(),
            unit: "orders".to_string(),
            source: UnitError::invalid_config("missing attribute 'path'"),
        };

        let text = err.to_string();
        assert!(text.contains("nightly"));
        assert!(text.contains("orders"));
        assert!(text.contains("path"));
        assert_eq!(err.job(), "nightly");
    }

    #[test]
    fn test_unknown_unit_type_error() {
        let err = PipelineError::UnknownUnitType {
            job: "j1".to_string(),
            unit_type: "Frobnicate".to_string(),
        };
        assert!(err.to_string().contains("unknown unit type 'Frobnicate'"));
    }

    #[test]
    fn test_script_error_kinds_share_one_type() {
        let compile = ScriptError::compile("unexpected token");
        let runtime = ScriptError::runtime("division by zero");
        assert!(compile.to_string().starts_with("Script error: compile"));
        assert!(runtime.to_string().starts_with("Script error: runtime"));
    }

    #[test]
    fn test_batch_transaction_error_display() {
        let err = BatchTransactionError::new(
            TransactionPhase::Commit,
            DbError::Transaction("disk full".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "Batch transaction failed during commit: Transaction error: disk full"
        );
    }

    #[test]
    fn test_worker_error_from_configuration() {
        let err: WorkerError = ConfigurationError::MissingSetting("database.kind".into()).into();
        assert!(matches!(err, WorkerError::Configuration(_)));
    }
}
