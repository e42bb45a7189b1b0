//! Salesforce event log query resolution
//!
//! Turns declarative query templates into executable SOQL for one scheduled
//! run, and computes the incremental time window each query covers.
//!
//! # Core Operations
//!
//! - **Window**: `[watermark, floor(now - lag))`, aligned to the generation interval
//! - **Bind**: standard window bindings plus `env` time expressions
//! - **Substitute**: exact-name placeholder expansion, unbound names fail
//! - **Cascade**: per-query overrides over instance defaults, once per query
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use sfdc_query::prelude::*;
//!
//! let defaults = InstanceDefaults::new("prod", "CreatedDate", GenerationInterval::Hourly, 60);
//! let resolver = QueryResolver::new(defaults);
//! let template = QueryTemplate::new("SELECT Id FROM LoginHistory WHERE LoginTime>={from_timestamp}");
//!
//! let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
//! let resolved = resolver.resolve(&template, None, now).unwrap();
//! assert_eq!(
//!     resolved.query(),
//!     "SELECT Id FROM LoginHistory WHERE LoginTime>=2024-01-01T03:00:00.000Z"
//! );
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod clock;
pub mod effective;
pub mod error;
pub mod expr;
pub mod interval;
pub mod key;
pub mod resolver;
pub mod template;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use effective::{EffectiveQuery, InstanceDefaults};
pub use error::{ClockError, ResolveError, TemplateError, UnknownInterval};
pub use expr::{EnvExpr, ExprParseError};
pub use interval::GenerationInterval;
pub use key::QueryKey;
pub use resolver::{QueryResolver, ResolvedQuery};
pub use template::{ParsedTemplate, QueryTemplate};
pub use window::{format_timestamp, ExtractionWindow, Watermark};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for resolving queries
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::effective::{EffectiveQuery, InstanceDefaults};
    pub use crate::error::{ClockError, ResolveError, TemplateError};
    pub use crate::interval::GenerationInterval;
    pub use crate::key::QueryKey;
    pub use crate::resolver::{QueryResolver, ResolvedQuery};
    pub use crate::template::QueryTemplate;
    pub use crate::window::{ExtractionWindow, Watermark};
}
