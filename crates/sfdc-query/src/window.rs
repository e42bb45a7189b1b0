//! Watermarks and extraction windows
//!
//! A run extracts `[from, to)` where `to` is the lagged current time floored
//! to the generation interval and `from` is the prior watermark (or the
//! initial lookback on first run). Lower bounds never move backwards.

use crate::effective::InstanceDefaults;
use crate::error::ClockError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Render an instant as a SOQL dateTime literal (`2024-01-01T03:00:00.000Z`)
#[inline]
#[must_use]
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Upper bound of the last successful extraction for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Wrap an instant
    #[inline]
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Instant of the watermark
    #[inline]
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Parse an RFC 3339 timestamp with any offset, normalized to UTC
    ///
    /// # Errors
    /// `ClockError::InvalidTimestamp` if the text is not RFC 3339
    pub fn parse(value: &str) -> Result<Self, ClockError> {
        DateTime::parse_from_rfc3339(value.trim())
            .map(|t| Self(t.with_timezone(&Utc)))
            .map_err(|e| ClockError::InvalidTimestamp {
                value: value.to_string(),
                message: e.to_string(),
            })
    }
}

impl FromStr for Watermark {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_timestamp(self.0))
    }
}

/// Half-open time range extracted by one run of one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractionWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl ExtractionWindow {
    /// Compute the window for a query
    ///
    /// # Arguments
    /// * `defaults` - Instance lag, lookback and generation interval
    /// * `watermark` - Prior watermark, `None` on first run
    /// * `now` - Current time for the run
    ///
    /// # Errors
    /// `ClockError::OutOfRange` if the lag or lookback cannot be subtracted
    pub fn compute(
        defaults: &InstanceDefaults,
        watermark: Option<&Watermark>,
        now: DateTime<Utc>,
    ) -> Result<Self, ClockError> {
        let upper = upper_bound(defaults, now)?;
        let from = match watermark {
            Some(w) => w.at(),
            None => {
                let start = checked_sub(now, defaults.initial_lookback(), "initial lookback")?;
                defaults.generation_interval.floor(start)
            }
        };

        // A watermark ahead of the upper bound yields an empty window pinned
        // at the watermark.
        Ok(Self {
            from,
            to: upper.max(from),
        })
    }

    /// Inclusive lower bound
    #[inline]
    #[must_use]
    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    /// Exclusive upper bound
    #[inline]
    #[must_use]
    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    /// Whether the window covers no time
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    /// Covered span
    #[inline]
    #[must_use]
    pub fn span(&self) -> Duration {
        self.to - self.from
    }

    /// Watermark to persist once the window was extracted successfully
    #[inline]
    #[must_use]
    pub fn next_watermark(&self) -> Watermark {
        Watermark(self.to)
    }
}

impl fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            format_timestamp(self.from),
            format_timestamp(self.to)
        )
    }
}

/// Lagged, interval-aligned upper bound shared by every query of a run
///
/// # Errors
/// `ClockError::OutOfRange` if `now - lag` is not representable
pub fn upper_bound(
    defaults: &InstanceDefaults,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ClockError> {
    let lagged = checked_sub(now, defaults.time_lag(), "time lag")?;
    Ok(defaults.generation_interval.floor(lagged))
}

fn checked_sub(
    now: DateTime<Utc>,
    by: Duration,
    what: &str,
) -> Result<DateTime<Utc>, ClockError> {
    now.checked_sub_signed(by).ok_or_else(|| {
        ClockError::OutOfRange(format!(
            "cannot subtract {what} of {} minutes from {now}",
            by.num_minutes()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::GenerationInterval;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, mi, 0).unwrap()
    }

    fn hourly(lag: u32) -> InstanceDefaults {
        InstanceDefaults::new("org", "CreatedDate", GenerationInterval::Hourly, lag)
    }

    #[test]
    fn first_run_uses_lookback() {
        let window = ExtractionWindow::compute(&hourly(60), None, at(2, 3, 0)).unwrap();
        assert_eq!(window.from(), at(1, 3, 0));
        assert_eq!(window.to(), at(2, 2, 0));
        assert_eq!(window.span(), Duration::hours(23));
    }

    #[test]
    fn lag_and_alignment() {
        let window = ExtractionWindow::compute(&hourly(300), None, at(2, 3, 0)).unwrap();
        assert_eq!(window.to(), at(1, 22, 0));

        let window = ExtractionWindow::compute(&hourly(10), None, at(2, 3, 25)).unwrap();
        assert_eq!(window.to(), at(2, 3, 0));
    }

    #[test]
    fn watermark_is_lower_bound() {
        let w = Watermark::new(at(2, 0, 0));
        let window = ExtractionWindow::compute(&hourly(60), Some(&w), at(2, 3, 0)).unwrap();
        assert_eq!(window.from(), at(2, 0, 0));
        assert_eq!(window.next_watermark(), Watermark::new(at(2, 2, 0)));
    }

    #[test]
    fn watermark_ahead_of_upper_bound_gives_empty_window() {
        let w = Watermark::new(at(2, 5, 0));
        let window = ExtractionWindow::compute(&hourly(60), Some(&w), at(2, 3, 0)).unwrap();
        assert!(window.is_empty());
        assert_eq!(window.next_watermark(), w);
    }

    #[test]
    fn daily_alignment() {
        let defaults = InstanceDefaults::new("org", "LogDate", GenerationInterval::Daily, 60);
        let window = ExtractionWindow::compute(&defaults, None, at(3, 0, 30)).unwrap();
        assert_eq!(window.to(), at(2, 0, 0));
        assert_eq!(window.from(), at(2, 0, 0));
    }

    #[test]
    fn lag_underflow_is_clock_error() {
        let err = ExtractionWindow::compute(&hourly(60), None, DateTime::<Utc>::MIN_UTC);
        assert!(matches!(err, Err(ClockError::OutOfRange(_))));
    }

    #[test]
    fn watermark_parse_normalizes_offset() {
        let w = Watermark::parse("2024-01-02T05:00:00+02:00").unwrap();
        assert_eq!(w.at(), at(2, 3, 0));
        assert_eq!(w.to_string(), "2024-01-02T03:00:00.000Z");
        assert!(Watermark::parse("yesterday").is_err());
    }

    #[test]
    fn window_display() {
        let window = ExtractionWindow::compute(&hourly(60), None, at(2, 3, 0)).unwrap();
        assert_eq!(
            window.to_string(),
            "[2024-01-01T03:00:00.000Z, 2024-01-02T02:00:00.000Z)"
        );
    }
}
