//! Configuration for the event log query resolver
//!
//! Loads the YAML document listing Salesforce instances and their queries,
//! merges external query files and validates instance settings up front so
//! that configuration mistakes stop the process before any query runs.
//!
//! # Core Operations
//!
//! - **Load**: parse the document and every referenced query file
//! - **Merge**: shared queries first, then instance queries, in file order
//! - **Validate**: required settings, interval names, non-negative lags
//!
//! # Example
//!
//! ```rust
//! use sfdc_config::ConfigLoader;
//!
//! let yaml = r#"
//! instances:
//!   - name: prod
//!     arguments:
//!       date_field: CreatedDate
//!       generation_interval: Hourly
//!       time_lag_minutes: 300
//!     queries:
//!       - "SELECT Id FROM LoginHistory WHERE LoginTime>={from_timestamp}"
//! "#;
//!
//! let instances = ConfigLoader::new().parse(yaml, ".").unwrap();
//! assert_eq!(instances[0].defaults.time_lag_minutes, 300);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod instance;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use instance::{CacheSettings, InstanceConfig};
pub use loader::ConfigLoader;
