//! Error types for the marker sweep engine.
//!
//! Three families matter to callers:
//! - transient store failures (connectivity, driver errors) that end the current run
//! - data integrity failures that end the current chunk and halt the run
//! - configuration failures surfaced at startup, before any cursor is opened

use thiserror::Error;

use crate::config::ConfigurationError;

/// PostgreSQL SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SweepError {
    /// Page fetch, transaction begin, chunk write or commit failed
    #[error("Transient store error during {operation}: {reason}")]
    TransientStore { operation: String, reason: String },

    /// Marker collision or a chunk that no longer matches the rows in the store
    #[error("Data integrity error during {operation}: {reason}")]
    DataIntegrity { operation: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl SweepError {
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientStore {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn integrity(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Classify a driver error raised while performing `operation`
    pub fn from_store(operation: &str, err: sqlx::Error) -> Self {
        let is_unique_violation = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .is_some_and(|code| code == UNIQUE_VIOLATION);

        if is_unique_violation {
            Self::integrity(operation, err.to_string())
        } else {
            Self::transient(operation, err.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore { .. })
    }

    /// Short label used as a structured logging field
    pub fn category(&self) -> &'static str {
        match self {
            Self::TransientStore { .. } => "transient_store",
            Self::DataIntegrity { .. } => "data_integrity",
            Self::Configuration(_) => "configuration",
            Self::WorkerUnavailable(_) => "worker_unavailable",
        }
    }
}

impl From<sqlx::Error> for SweepError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_store("store operation", err)
    }
}

impl From<sqlx::migrate::MigrateError> for SweepError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::configuration(format!("database migration failed: {err}"))
    }
}

impl From<ConfigurationError> for SweepError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type SweepResult<T> = std::result::Result<T, SweepError>;
