//! Raw configuration document
//!
//! Mirrors the YAML layout one-to-one. Values are validated into
//! [`InstanceConfig`](crate::instance::InstanceConfig) by the loader; keys
//! this crate has no use for (auth, token URL, Redis, telemetry endpoint,
//! service schedule) are ignored.

use serde::Deserialize;
use sfdc_query::template::deserialize_api_version;
use sfdc_query::QueryTemplate;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    /// Salesforce instances to poll
    #[serde(default)]
    pub instances: Vec<RawInstance>,

    /// Queries shared by every instance
    #[serde(default)]
    pub queries: Vec<QueryEntry>,
}

/// One Salesforce instance
#[derive(Debug, Clone, Deserialize)]
pub struct RawInstance {
    /// Instance name
    pub name: String,

    /// Instance settings
    #[serde(default)]
    pub arguments: RawArguments,

    /// Queries for this instance only
    #[serde(default)]
    pub queries: Vec<QueryEntry>,
}

/// Instance settings as written
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArguments {
    /// API version, numeric or string in YAML
    #[serde(default, deserialize_with = "deserialize_api_version")]
    pub api_ver: Option<String>,

    /// Timestamp field of the built-in EventLogFile query
    pub date_field: Option<String>,

    /// `Hourly` or `Daily`
    pub generation_interval: Option<String>,

    /// Minutes subtracted from now for the window upper bound
    pub time_lag_minutes: Option<i64>,

    /// Window length in minutes when no watermark exists
    pub initial_lookback_minutes: Option<i64>,

    /// Whether forwarded record ids are cached
    pub cache_enabled: Option<bool>,

    /// Days a cached id is kept
    pub cache_expire_days: Option<i64>,
}

/// Entry of a query list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QueryEntry {
    /// Full template mapping
    Template(QueryTemplate),
    /// Bare SOQL text, or a `.yml`/`.yaml` file reference
    Text(String),
}

impl QueryEntry {
    /// File reference, if this entry names a query file
    #[must_use]
    pub fn include_path(&self) -> Option<&str> {
        match self {
            Self::Text(text) if is_query_file(text) => Some(text.trim()),
            _ => None,
        }
    }
}

/// Query file contents
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QueryFile {
    /// `queries:` mapping
    Wrapped {
        /// Entries of the file
        queries: Vec<QueryEntry>,
    },
    /// Bare list
    Bare(Vec<QueryEntry>),
}

impl QueryFile {
    /// Entries in file order
    #[must_use]
    pub fn into_entries(self) -> Vec<QueryEntry> {
        match self {
            Self::Wrapped { queries } | Self::Bare(queries) => queries,
        }
    }
}

fn is_query_file(text: &str) -> bool {
    let lower = text.trim().to_ascii_lowercase();
    !lower.contains(char::is_whitespace) && (lower.ends_with(".yml") || lower.ends_with(".yaml"))
}
