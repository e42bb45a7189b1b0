//! State for the event log query resolver
//!
//! # Core Operations
//!
//! - **Load**: last committed watermark of a query, if any
//! - **Commit**: advance a watermark after successful extraction; never backwards
//! - **Dedup**: remember forwarded record ids for a configurable number of days

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod dedup;
pub mod error;
pub mod file;
pub mod watermark;

pub use dedup::{DedupCache, MemoryDedupCache};
pub use error::{StoreError, StoreResult};
pub use file::JsonFileWatermarkStore;
pub use watermark::{MemoryWatermarkStore, WatermarkStore};
