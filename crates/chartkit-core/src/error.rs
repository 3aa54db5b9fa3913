//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart: {message}")]
    InvalidChart { message: String },

    #[error("Invalid chart name '{name}': {reason}")]
    InvalidChartName { name: String, reason: String },

    #[error("Failed to parse {file}: {source}")]
    YamlParse {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize YAML: {0}")]
    YamlWrite(#[from] serde_yaml::Error),

    #[error("Failed to encode JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl CoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidChart {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
