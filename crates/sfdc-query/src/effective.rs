//! Instance defaults and per-query effective configuration
//!
//! Per-query overrides cascade over instance defaults exactly once, in
//! [`EffectiveQuery::resolve`]. Nothing downstream falls back on its own.

use crate::interval::GenerationInterval;
use crate::template::QueryTemplate;
use chrono::Duration;
use serde::Serialize;

/// API version used when an instance does not configure one
pub const DEFAULT_API_VERSION: &str = "52.0";

/// Lookback applied on the first run of a query (24 hours)
pub const DEFAULT_INITIAL_LOOKBACK_MINUTES: u32 = 24 * 60;

/// Output field the event timestamp is written to unless renamed
pub const DEFAULT_TIMESTAMP_FIELD: &str = "timestamp";

/// Validated instance-level settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDefaults {
    /// Instance name, used to namespace watermark keys
    pub name: String,
    /// Default REST API version
    pub api_ver: String,
    /// Default event-time field
    pub date_field: String,
    /// Upstream log generation granularity
    pub generation_interval: GenerationInterval,
    /// Safety buffer subtracted from the current time
    pub time_lag_minutes: u32,
    /// Lookback used when a query has no watermark yet
    pub initial_lookback_minutes: u32,
}

impl InstanceDefaults {
    /// Create defaults with the required settings
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        date_field: impl Into<String>,
        generation_interval: GenerationInterval,
        time_lag_minutes: u32,
    ) -> Self {
        Self {
            name: name.into(),
            api_ver: DEFAULT_API_VERSION.to_string(),
            date_field: date_field.into(),
            generation_interval,
            time_lag_minutes,
            initial_lookback_minutes: DEFAULT_INITIAL_LOOKBACK_MINUTES,
        }
    }

    /// Override API version
    #[inline]
    #[must_use]
    pub fn with_api_ver(mut self, api_ver: impl Into<String>) -> Self {
        self.api_ver = api_ver.into();
        self
    }

    /// Override first-run lookback
    #[inline]
    #[must_use]
    pub fn with_initial_lookback_minutes(mut self, minutes: u32) -> Self {
        self.initial_lookback_minutes = minutes;
        self
    }

    /// Time lag as a duration
    #[inline]
    #[must_use]
    pub fn time_lag(&self) -> Duration {
        Duration::minutes(i64::from(self.time_lag_minutes))
    }

    /// First-run lookback as a duration
    #[inline]
    #[must_use]
    pub fn initial_lookback(&self) -> Duration {
        Duration::minutes(i64::from(self.initial_lookback_minutes))
    }
}

/// Settings in force for one query after overrides are applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveQuery {
    /// REST API version for the request
    pub api_ver: String,
    /// Result column holding the event time
    pub timestamp_attr: String,
    /// Output field the timestamp is renamed to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_timestamp: Option<String>,
    /// Event type override for emitted records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Fields forming a compound record id
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub id_fields: Vec<String>,
}

impl EffectiveQuery {
    /// Cascade template overrides over instance defaults
    #[must_use]
    pub fn resolve(template: &QueryTemplate, defaults: &InstanceDefaults) -> Self {
        Self {
            api_ver: template
                .api_ver
                .clone()
                .unwrap_or_else(|| defaults.api_ver.clone()),
            timestamp_attr: template
                .timestamp_attr
                .clone()
                .unwrap_or_else(|| defaults.date_field.clone()),
            rename_timestamp: template.rename_timestamp.clone(),
            event_type: template.event_type.clone(),
            id_fields: template.id.clone(),
        }
    }

    /// Output field the event timestamp lands in
    #[inline]
    #[must_use]
    pub fn timestamp_field(&self) -> &str {
        self.rename_timestamp
            .as_deref()
            .unwrap_or(DEFAULT_TIMESTAMP_FIELD)
    }

    /// Whether the timestamp is emitted under a custom name
    #[inline]
    #[must_use]
    pub fn is_timestamp_renamed(&self) -> bool {
        self.timestamp_field() != DEFAULT_TIMESTAMP_FIELD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> InstanceDefaults {
        InstanceDefaults::new("org", "LogDate", GenerationInterval::Hourly, 300)
            .with_api_ver("55.0")
    }

    #[test]
    fn instance_defaults_apply_without_overrides() {
        let template = QueryTemplate::new("SELECT Id FROM EventLogFile");
        let effective = EffectiveQuery::resolve(&template, &defaults());

        assert_eq!(effective.api_ver, "55.0");
        assert_eq!(effective.timestamp_attr, "LogDate");
        assert_eq!(effective.timestamp_field(), "timestamp");
        assert!(!effective.is_timestamp_renamed());
    }

    #[test]
    fn template_overrides_win() {
        let template = QueryTemplate::new("SELECT Id FROM LoginHistory")
            .with_api_ver("58.0")
            .with_timestamp_attr("CreatedData")
            .with_rename_timestamp("actualTimestamp");
        let effective = EffectiveQuery::resolve(&template, &defaults());

        assert_eq!(effective.api_ver, "58.0");
        // carried verbatim, never corrected
        assert_eq!(effective.timestamp_attr, "CreatedData");
        assert_eq!(effective.timestamp_field(), "actualTimestamp");
        assert!(effective.is_timestamp_renamed());
    }

    #[test]
    fn default_api_version() {
        let d = InstanceDefaults::new("org", "CreatedDate", GenerationInterval::Daily, 0);
        assert_eq!(d.api_ver, DEFAULT_API_VERSION);
        assert_eq!(d.initial_lookback(), Duration::hours(24));
    }
}
