//! Record shaping
//!
//! Turns query result rows into log entries. Two shapes exist:
//!
//! - **Event rows**: one JSON object per record, timestamp taken from the
//!   effective `timestamp_attr`
//! - **Log file rows**: CSV rows of a downloaded EventLogFile, timestamp
//!   taken from the `TIMESTAMP` column
//!
//! Rows whose id the dedup cache already holds are dropped. New ids are
//! only staged in [`PendingIds`]; the runner records them once the query
//! has committed, so a failed query leaves the cache untouched.

use crate::error::RecordError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sfdc_query::EffectiveQuery;
use sfdc_state::DedupCache;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// One result row
pub type Row = Map<String, Value>;

/// Event type to the CSV columns forwarded for it
pub type EventTypeFields = HashMap<String, Vec<String>>;

/// Entries per batch handed downstream
pub const MAX_BATCH_SIZE: usize = 1000;

/// Event type when a row carries none
pub const DEFAULT_EVENT_TYPE: &str = "SFEvent";

/// Dedup scope for fully processed Hourly log files
pub const LOG_FILE_SCOPE: &str = "logfiles";

const EVENT_TYPE_FIELD: &str = "EVENT_TYPE";
const CSV_TIMESTAMP_FIELD: &str = "TIMESTAMP";
const CSV_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%.f";
const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
const REQUEST_ID_FIELD: &str = "REQUEST_ID";

/// Shaped log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Human-readable summary
    pub message: String,
    /// Epoch milliseconds, present only when the timestamp is not renamed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Row fields
    pub attributes: Row,
}

/// Group of entries sent downstream together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogBatch {
    /// Entries, at most [`MAX_BATCH_SIZE`]
    pub log_entries: Vec<LogEntry>,
}

impl LogBatch {
    /// Split entries into batches of at most [`MAX_BATCH_SIZE`]
    #[must_use]
    pub fn chunk(entries: Vec<LogEntry>) -> Vec<Self> {
        let mut batches = Vec::with_capacity(entries.len().div_ceil(MAX_BATCH_SIZE));
        let mut iter = entries.into_iter().peekable();
        while iter.peek().is_some() {
            batches.push(Self {
                log_entries: iter.by_ref().take(MAX_BATCH_SIZE).collect(),
            });
        }
        batches
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.log_entries.len()
    }

    /// Whether the batch holds no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log_entries.is_empty()
    }
}

/// EventLogFile record pointing at a downloadable CSV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileRecord {
    /// Record id
    pub id: String,
    /// Event type of the file's rows
    pub event_type: String,
    /// `Hourly` or `Daily`, when reported
    pub interval: Option<String>,
    /// Relative download path
    pub log_file: String,
}

impl LogFileRecord {
    /// Extract log file metadata from a query row
    ///
    /// # Errors
    /// `RecordError::MissingField` if `Id` or `LogFile` is absent
    pub fn from_row(row: &Row) -> Result<Self, RecordError> {
        let field = |name: &str| row.get(name).filter(|v| !v.is_null()).map(value_text);
        Ok(Self {
            id: field("Id").ok_or_else(|| RecordError::missing("Id"))?,
            event_type: field("EventType").unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            interval: field("Interval"),
            log_file: field("LogFile").ok_or_else(|| RecordError::missing("LogFile"))?,
        })
    }

    /// Whether the file covers a single hour
    #[inline]
    #[must_use]
    pub fn is_hourly(&self) -> bool {
        self.interval.as_deref() == Some("Hourly")
    }
}

/// Whether rows are EventLogFile records rather than plain events
#[must_use]
pub fn is_log_file_response(rows: &[Row]) -> bool {
    rows.first().map_or(true, |row| row.contains_key("LogFile"))
}

/// Ids seen while shaping one query, recorded only after it commits
#[derive(Debug, Default)]
pub struct PendingIds {
    ids: Vec<(String, String)>,
    seen: HashSet<(String, String)>,
}

impl PendingIds {
    /// Create empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `id` under `scope`, returning whether it was already staged
    pub fn stage(&mut self, scope: &str, id: &str) -> bool {
        let key = (scope.to_string(), id.to_string());
        if self.seen.contains(&key) {
            return true;
        }
        self.seen.insert(key.clone());
        self.ids.push(key);
        false
    }

    /// Whether `id` is staged under `scope`
    #[must_use]
    pub fn contains(&self, scope: &str, id: &str) -> bool {
        self.seen.contains(&(scope.to_string(), id.to_string()))
    }

    /// Number of staged ids
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is staged
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Record every staged id, in staging order
    pub fn record_into(self, cache: &dyn DedupCache) {
        for (scope, id) in &self.ids {
            cache.record(scope, id);
        }
    }
}

/// Shapes rows of one query into log entries
pub struct RecordShaper<'a> {
    effective: &'a EffectiveQuery,
    now: DateTime<Utc>,
    cache: Option<&'a dyn DedupCache>,
    event_type_fields: Option<&'a EventTypeFields>,
}

impl<'a> RecordShaper<'a> {
    /// Create shaper for a query's effective settings
    ///
    /// # Arguments
    /// * `effective` - Overrides in force for the query
    /// * `now` - Run time, used for rows without a timestamp
    #[must_use]
    pub fn new(effective: &'a EffectiveQuery, now: DateTime<Utc>) -> Self {
        Self {
            effective,
            now,
            cache: None,
            event_type_fields: None,
        }
    }

    /// Drop rows already recorded in `cache`
    #[must_use]
    pub fn with_cache(mut self, cache: Option<&'a dyn DedupCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Forward only the listed CSV columns per event type
    #[must_use]
    pub fn with_event_type_fields(mut self, fields: Option<&'a EventTypeFields>) -> Self {
        self.event_type_fields = fields;
        self
    }

    /// Shape one event row
    ///
    /// Returns `Ok(None)` when the row's id under `scope` is already in the
    /// cache or in `pending`. Otherwise the id is staged in `pending`.
    ///
    /// # Errors
    /// `RecordError::MissingIdField` if a compound id field is absent,
    /// `RecordError::InvalidTimestamp` if the timestamp does not parse
    pub fn shape_event(
        &self,
        scope: &str,
        mut row: Row,
        pending: &mut PendingIds,
    ) -> Result<Option<LogEntry>, RecordError> {
        let id = match row.get("Id") {
            Some(id) => Some(value_text(id)),
            None => {
                let compound = self.compound_id(&row)?;
                if let Some(id) = &compound {
                    row.insert("Id".to_string(), Value::String(id.clone()));
                }
                compound
            }
        };

        let field = self.effective.timestamp_attr.as_str();
        let (timestamp, stamp_text) = match row.get(field).filter(|v| !v.is_null()) {
            Some(value) => {
                let text = value.as_str().ok_or_else(|| invalid_timestamp(field, &value_text(value)))?;
                (parse_event_timestamp(field, text)?, Some(text.to_string()))
            }
            None => (self.now.timestamp_millis(), None),
        };

        let mut event_type = self
            .effective
            .event_type
            .clone()
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());
        if let Some(Value::Object(attributes)) = row.remove("attributes") {
            if let Some(Value::String(kind)) = attributes.get("type") {
                event_type = self.effective.event_type.clone().unwrap_or_else(|| kind.clone());
                row.insert(EVENT_TYPE_FIELD.to_string(), Value::String(event_type.clone()));
            }
        }

        if let Some(id) = &id {
            if self.is_duplicate(scope, id, pending) {
                tracing::debug!(scope, id = %id, "record already seen, skipping");
                return Ok(None);
            }
        }

        let message = match stamp_text {
            Some(text) => format!("{event_type} {text}"),
            None => event_type,
        };
        Ok(Some(self.finish(message, timestamp, row)))
    }

    /// Shape the CSV rows of one log file
    ///
    /// Rows already recorded under the file's id are dropped; the ids of the
    /// remaining rows are staged in `pending`.
    ///
    /// # Errors
    /// `RecordError::MissingField` if a projected column is absent,
    /// `RecordError::InvalidTimestamp` if `TIMESTAMP` does not parse
    pub fn shape_log_file(
        &self,
        file: &LogFileRecord,
        rows: Vec<Row>,
        pending: &mut PendingIds,
    ) -> Result<Vec<LogEntry>, RecordError> {
        let event_type = self
            .effective
            .event_type
            .clone()
            .unwrap_or_else(|| file.event_type.clone());
        let projection = self
            .event_type_fields
            .and_then(|fields| fields.get(&event_type));

        let fresh: Vec<Row> = rows
            .into_iter()
            .filter(|row| !self.is_duplicate(&file.id, &csv_row_id(row), pending))
            .collect();

        let mut entries = Vec::with_capacity(fresh.len());
        for (index, row) in fresh.into_iter().enumerate() {
            let timestamp = match row.get(CSV_TIMESTAMP_FIELD).and_then(Value::as_str) {
                Some(text) if !text.is_empty() => parse_csv_timestamp(text)?,
                _ => self.now.timestamp() * 1000,
            };

            let mut attributes = match projection {
                Some(columns) => columns
                    .iter()
                    .map(|c| {
                        row.get(c)
                            .map(|v| (c.clone(), v.clone()))
                            .ok_or_else(|| RecordError::missing(c.as_str()))
                    })
                    .collect::<Result<Row, _>>()?,
                None => row,
            };

            attributes.insert("LogFileId".to_string(), Value::String(file.id.clone()));
            attributes.remove(CSV_TIMESTAMP_FIELD);
            let actual = attributes
                .remove(EVENT_TYPE_FIELD)
                .map_or_else(|| DEFAULT_EVENT_TYPE.to_string(), |v| value_text(&v));
            let row_type = self.effective.event_type.clone().unwrap_or(actual);
            attributes.insert(EVENT_TYPE_FIELD.to_string(), Value::String(row_type));

            let message = format!("LogFile {} row {index}", file.id);
            entries.push(self.finish(message, timestamp, attributes));
        }
        Ok(entries)
    }

    fn is_duplicate(&self, scope: &str, id: &str, pending: &mut PendingIds) -> bool {
        match self.cache {
            Some(cache) => cache.contains(scope, id) || pending.stage(scope, id),
            None => false,
        }
    }

    fn finish(&self, message: String, timestamp: i64, mut attributes: Row) -> LogEntry {
        attributes.insert(
            self.effective.timestamp_field().to_string(),
            Value::from(timestamp),
        );
        LogEntry {
            message,
            timestamp: (!self.effective.is_timestamp_renamed()).then_some(timestamp),
            attributes,
        }
    }

    fn compound_id(&self, row: &Row) -> Result<Option<String>, RecordError> {
        let mut joined = String::new();
        for field in &self.effective.id_fields {
            let value = row.get(field).ok_or_else(|| RecordError::MissingIdField {
                field: field.clone(),
            })?;
            joined.push_str(&value_text(value));
        }
        if joined.is_empty() {
            return Ok(None);
        }
        Ok(Some(hex::encode(Sha256::digest(joined.as_bytes()))))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn csv_row_id(row: &Row) -> String {
    match row.get(REQUEST_ID_FIELD).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            // serde_json maps iterate in key order
            let mut hasher = Sha256::new();
            for (key, value) in row {
                hasher.update(key.as_bytes());
                hasher.update([0]);
                hasher.update(value_text(value).as_bytes());
                hasher.update([0]);
            }
            hex::encode(hasher.finalize())
        }
    }
}

fn invalid_timestamp(field: &str, value: &str) -> RecordError {
    RecordError::InvalidTimestamp {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn parse_event_timestamp(field: &str, text: &str) -> Result<i64, RecordError> {
    DateTime::parse_from_str(text, EVENT_TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|t| t.timestamp_millis())
        .map_err(|_| invalid_timestamp(field, text))
}

fn parse_csv_timestamp(text: &str) -> Result<i64, RecordError> {
    NaiveDateTime::parse_from_str(text, CSV_TIMESTAMP_FORMAT)
        .map(|t| t.and_utc().timestamp() * 1000)
        .map_err(|_| invalid_timestamp(CSV_TIMESTAMP_FIELD, text))
}
