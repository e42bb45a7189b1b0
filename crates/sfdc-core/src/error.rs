//! Error types for planning and running queries
//!
//! [`RunError`] aborts the whole invocation. Everything else is wrapped in
//! [`QueryError`] and reported against the single query it belongs to.

use sfdc_config::ConfigError;
use sfdc_query::{ClockError, TemplateError};
use sfdc_state::StoreError;

/// Errors that invalidate every query of a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Window arithmetic failed for the run's clock reading
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failure reported by the external query executor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// API answered with a non-success status
    #[error("request failed with status {status}: {message}")]
    Request {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Request never completed
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ExecutionError {
    /// Create request error from status and body
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }
}

/// Row could not be shaped into a log entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Compound id field absent from the row
    #[error("error building compound id, key '{field}' not found")]
    MissingIdField {
        /// Configured id field
        field: String,
    },

    /// Required column absent from the row
    #[error("missing field '{field}'")]
    MissingField {
        /// Column name
        field: String,
    },

    /// Timestamp column does not parse
    #[error("invalid timestamp in '{field}': {value}")]
    InvalidTimestamp {
        /// Timestamp column
        field: String,
        /// Value found in the column
        value: String,
    },
}

impl RecordError {
    /// Create missing field error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Errors scoped to one query
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Template could not be expanded
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Watermark could not be loaded or committed
    #[error("watermark store: {0}")]
    Store(#[from] StoreError),

    /// Executor failed to run the query or fetch a log file
    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    /// Result row could not be shaped
    #[error("record: {0}")]
    Record(#[from] RecordError),
}
