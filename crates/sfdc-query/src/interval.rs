//! Log generation intervals
//!
//! Salesforce produces EventLogFile exports either hourly or daily. The
//! interval decides where extraction window boundaries fall.

use crate::error::UnknownInterval;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Granularity at which a log type is generated upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GenerationInterval {
    /// Boundaries at the start of each UTC hour
    Hourly,
    /// Boundaries at 00:00 UTC
    Daily,
}

impl GenerationInterval {
    /// Name as used in `Interval='...'` filters
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "Hourly",
            Self::Daily => "Daily",
        }
    }

    /// Length of one interval
    #[inline]
    #[must_use]
    pub fn period(self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
        }
    }

    /// Truncate `t` to the start of the interval containing it
    #[must_use]
    pub fn floor(self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = t.date_naive();
        let start = match self {
            Self::Hourly => date.and_hms_opt(t.hour(), 0, 0),
            Self::Daily => date.and_hms_opt(0, 0, 0),
        };
        // hour() is always < 24, so and_hms_opt cannot fail here
        start.map_or(t, |naive| naive.and_utc())
    }

    /// Whether `t` already sits on an interval boundary
    #[inline]
    #[must_use]
    pub fn is_aligned(self, t: DateTime<Utc>) -> bool {
        self.floor(t) == t
    }
}

impl FromStr for GenerationInterval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            _ => Err(UnknownInterval(s.to_string())),
        }
    }
}

impl fmt::Display for GenerationInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
