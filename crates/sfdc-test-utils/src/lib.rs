//! Testing utilities for the sfdc workspace
//!
//! Shared clocks, fixtures, and builders.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use sfdc_query::{Clock, GenerationInterval, InstanceDefaults, QueryTemplate};

pub const INSTANCE: &str = "test_org";

/// UTC instant from calendar fields
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("valid calendar fields")
}

/// Parse an RFC 3339 instant
pub fn rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

/// Clock that advances by `step` after every read
#[derive(Debug)]
pub struct SteppingClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }

    /// Time the next read will report
    pub fn peek(&self) -> DateTime<Utc> {
        *self.current.lock()
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.current.lock();
        *guard += by;
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut guard = self.current.lock();
        let now = *guard;
        *guard = now + self.step;
        now
    }
}

pub fn hourly_defaults(time_lag_minutes: u32) -> InstanceDefaults {
    InstanceDefaults::new(INSTANCE, "CreatedDate", GenerationInterval::Hourly, time_lag_minutes)
}

pub fn daily_defaults(time_lag_minutes: u32) -> InstanceDefaults {
    InstanceDefaults::new(INSTANCE, "LogDate", GenerationInterval::Daily, time_lag_minutes)
}

pub fn created_date_template() -> QueryTemplate {
    QueryTemplate::event_log_file("CreatedDate")
}

/// Template using `env` time expressions for its window
pub fn env_window_template() -> QueryTemplate {
    QueryTemplate::new(
        "SELECT Id,Action,CreatedDate FROM SetupAuditTrail \
         WHERE CreatedDate>={start_date} AND CreatedDate<{end_date}",
    )
    .with_env("end_date", "now()")
    .with_env("start_date", "now(timedelta(minutes=-60))")
}
