//! Validated instance configuration

use crate::error::{ConfigError, ConfigResult};
use crate::model::RawArguments;
use sfdc_query::effective::{DEFAULT_API_VERSION, DEFAULT_INITIAL_LOOKBACK_MINUTES};
use sfdc_query::{GenerationInterval, InstanceDefaults, QueryKey, QueryTemplate};
use std::collections::HashSet;

/// Days a deduplication entry is kept unless configured
pub const DEFAULT_CACHE_EXPIRE_DAYS: u32 = 2;

/// Deduplication cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Whether processed record ids are cached
    pub enabled: bool,
    /// Entry lifetime in days
    pub expire_days: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            expire_days: DEFAULT_CACHE_EXPIRE_DAYS,
        }
    }
}

/// One instance ready for planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    /// Instance-level defaults
    pub defaults: InstanceDefaults,
    /// Flattened query list, external files already merged
    pub queries: Vec<QueryTemplate>,
    /// Deduplication cache settings
    pub cache: CacheSettings,
}

impl InstanceConfig {
    /// Instance name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.defaults.name
    }

    /// Watermark keys paired with their templates, in list order
    #[must_use]
    pub fn keyed_queries(&self) -> Vec<(QueryKey, &QueryTemplate)> {
        self.queries
            .iter()
            .map(|t| (QueryKey::for_template(self.name(), t), t))
            .collect()
    }

    pub(crate) fn validate(
        name: &str,
        args: &RawArguments,
        mut queries: Vec<QueryTemplate>,
    ) -> ConfigResult<Self> {
        let date_field = required(name, "date_field", args.date_field.as_deref())?;
        let interval_raw = required(name, "generation_interval", args.generation_interval.as_deref())?;
        let generation_interval: GenerationInterval = interval_raw
            .parse()
            .map_err(|e: sfdc_query::UnknownInterval| {
                ConfigError::invalid(name, "generation_interval", e.to_string())
            })?;
        let time_lag_minutes = minutes(
            name,
            "time_lag_minutes",
            args.time_lag_minutes
                .ok_or_else(|| ConfigError::MissingSetting {
                    instance: name.to_string(),
                    key: "time_lag_minutes",
                })?,
        )?;
        let initial_lookback_minutes = match args.initial_lookback_minutes {
            Some(v) => minutes(name, "initial_lookback_minutes", v)?,
            None => DEFAULT_INITIAL_LOOKBACK_MINUTES,
        };
        let expire_days = match args.cache_expire_days {
            Some(v) if v > 0 => u32::try_from(v)
                .map_err(|_| ConfigError::invalid(name, "cache_expire_days", "value too large"))?,
            Some(v) => {
                return Err(ConfigError::invalid(
                    name,
                    "cache_expire_days",
                    format!("must be positive, got {v}"),
                ));
            }
            None => DEFAULT_CACHE_EXPIRE_DAYS,
        };

        let defaults = InstanceDefaults {
            name: name.to_string(),
            api_ver: args
                .api_ver
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            date_field: date_field.to_string(),
            generation_interval,
            time_lag_minutes,
            initial_lookback_minutes,
        };

        if queries.is_empty() {
            tracing::debug!(instance = name, "no queries configured, using built-in EventLogFile query");
            queries.push(QueryTemplate::event_log_file(&defaults.date_field));
        }

        let config = Self {
            defaults,
            queries,
            cache: CacheSettings {
                enabled: args.cache_enabled.unwrap_or(false),
                expire_days,
            },
        };
        config.check_unique_keys()?;
        Ok(config)
    }

    fn check_unique_keys(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for (key, _) in self.keyed_queries() {
            if !seen.insert(key.clone()) {
                return Err(ConfigError::DuplicateQuery {
                    instance: self.name().to_string(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn required<'a>(instance: &str, key: &'static str, value: Option<&'a str>) -> ConfigResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingSetting {
            instance: instance.to_string(),
            key,
        }),
    }
}

fn minutes(instance: &str, key: &'static str, value: i64) -> ConfigResult<u32> {
    u32::try_from(value).map_err(|_| {
        ConfigError::invalid(instance, key, format!("expected 0..={} minutes, got {value}", u32::MAX))
    })
}
