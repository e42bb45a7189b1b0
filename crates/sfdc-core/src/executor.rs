//! Query execution seam
//!
//! The HTTP client, authentication and CSV download live outside this
//! workspace. The runner only needs rows back.

use crate::error::ExecutionError;
use crate::records::{LogFileRecord, Row};
use sfdc_query::ResolvedQuery;

/// Runs resolved queries against the Salesforce REST API
pub trait QueryExecutor: Send + Sync {
    /// Execute a query and return every result row
    ///
    /// # Errors
    /// Returns `ExecutionError` if the request fails or the response is invalid
    fn execute(&self, query: &ResolvedQuery) -> Result<Vec<Row>, ExecutionError>;

    /// Download the CSV behind an EventLogFile record as header-keyed rows
    ///
    /// # Errors
    /// Returns `ExecutionError` if the download fails
    fn fetch_log_file(
        &self,
        query: &ResolvedQuery,
        file: &LogFileRecord,
    ) -> Result<Vec<Row>, ExecutionError>;
}
