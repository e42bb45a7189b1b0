//! Scheduled runs of Salesforce event log queries
//!
//! Ties resolution, execution and state together for one instance.
//!
//! # Core Operations
//!
//! - **Plan**: one clock reading, every query resolved in parallel
//! - **Execute**: rows fetched through a [`QueryExecutor`] supplied by the caller
//! - **Shape**: rows become log entries, deduplicated and batched
//! - **Commit**: a query's watermark advances only after it fully succeeded

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod executor;
pub mod planner;
pub mod records;
pub mod runner;

pub use error::{ExecutionError, QueryError, RecordError, RunError};
pub use executor::QueryExecutor;
pub use planner::{plan, plan_from_config, PlannedQuery, QueryFailure, RunPlan};
pub use records::{LogBatch, LogEntry, LogFileRecord, PendingIds, RecordShaper, Row};
pub use runner::{QuerySuccess, RunReport, Runner};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
