//! Error types for state persistence
//!
//! Store errors are per query: a failed commit leaves that query's
//! watermark unchanged so the next run re-extracts the same window.

use sfdc_query::{ClockError, QueryKey, Watermark};
use std::path::PathBuf;

/// Errors from watermark stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error on the state file
    #[error("io error on state file {path}: {source}")]
    Io {
        /// State file path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// State file is not a JSON object of strings
    #[error("corrupt state file {path}: {source}")]
    Serde {
        /// State file path
        path: PathBuf,
        /// Decoder error
        #[source]
        source: serde_json::Error,
    },

    /// Stored watermark is not an RFC 3339 timestamp
    #[error("invalid watermark for {key}: {source}")]
    InvalidTimestamp {
        /// Query the watermark belongs to
        key: QueryKey,
        /// Parse failure
        #[source]
        source: ClockError,
    },

    /// Commit would move a watermark backwards
    #[error("watermark regression for {key}: stored {stored}, attempted {attempted}")]
    Regression {
        /// Query the watermark belongs to
        key: QueryKey,
        /// Watermark currently persisted
        stored: Watermark,
        /// Earlier watermark that was refused
        attempted: Watermark,
    },
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
