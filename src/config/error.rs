//! Configuration Error Types
//!
//! Errors raised while locating, parsing and validating configuration. All of
//! them are fatal at startup.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Invalid YAML syntax or shape in configuration file
    #[error("Invalid YAML in configuration file '{file_path}': {error}")]
    InvalidYaml { file_path: String, error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// File I/O errors during configuration loading
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn invalid_yaml(file_path: impl Into<String>, error: impl ToString) -> Self {
        Self::InvalidYaml {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn file_read_error(file_path: impl Into<String>, error: impl ToString) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
