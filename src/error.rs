//! Error types for the drift evaluation engine

use thiserror::Error;

/// Engine-wide error taxonomy.
///
/// Statistical preconditions (`EmptyColumn`, `InsufficientData`) are kept as
/// their own variants so the drift analyzer can convert them into skipped-column
/// notes instead of failing a whole report.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    Validation {
        message: String,
        /// Remediation data returned to the caller (e.g. every real column
        /// name when a target column does not exist).
        available_columns: Option<Vec<String>>,
    },

    #[error("computation failed: {0}")]
    Computation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("column '{0}' has no valid values")]
    EmptyColumn(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Shorthand for a validation error without remediation data.
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            available_columns: None,
        }
    }

    /// Validation error listing the columns the caller could have used.
    pub fn unknown_column(column: &str, available: Vec<String>) -> Self {
        EngineError::Validation {
            message: format!("Target column '{column}' not found in dataset"),
            available_columns: Some(available),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
