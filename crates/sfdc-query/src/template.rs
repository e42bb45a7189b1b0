//! Query templates and placeholder scanning
//!
//! Template text uses `{name}` placeholders. `{{` and `}}` stand for literal
//! braces. Names follow `[A-Za-z_][A-Za-z0-9_]*`.

use crate::error::TemplateError;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Built-in EventLogFile query filtering on `CreatedDate`
pub const CREATED_DATE_QUERY: &str = "SELECT Id,EventType,CreatedDate,LogDate,Interval,LogFile,Sequence \
     From EventLogFile Where CreatedDate>={from_timestamp} AND CreatedDate<{to_timestamp} \
     AND Interval='{log_interval_type}'";

/// Built-in EventLogFile query filtering on `LogDate`
pub const LOG_DATE_QUERY: &str = "SELECT Id,EventType,CreatedDate,LogDate,Interval,LogFile,Sequence \
     From EventLogFile Where LogDate>={from_timestamp} AND LogDate<{to_timestamp} \
     AND Interval='{log_interval_type}'";

/// One entry of the configured query list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// SOQL text with placeholders
    #[serde(rename = "query")]
    pub text: String,

    /// Stable identity for watermark persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Result column holding the event time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_attr: Option<String>,

    /// Output name for the timestamp field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_timestamp: Option<String>,

    /// API version override
    #[serde(
        default,
        deserialize_with = "deserialize_api_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_ver: Option<String>,

    /// Event type override for emitted records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Fields concatenated into a compound id when rows lack `Id`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id: Vec<String>,

    /// Placeholder name to time expression
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

impl QueryTemplate {
    /// Create template from text with no overrides
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            name: None,
            timestamp_attr: None,
            rename_timestamp: None,
            api_ver: None,
            event_type: None,
            id: Vec::new(),
            env: IndexMap::new(),
        }
    }

    /// Built-in EventLogFile template for a date field
    ///
    /// `LogDate` (any case) selects the `LogDate` filter, anything else
    /// filters on `CreatedDate`.
    #[must_use]
    pub fn event_log_file(date_field: &str) -> Self {
        if date_field.eq_ignore_ascii_case("logdate") {
            Self::new(LOG_DATE_QUERY)
        } else {
            Self::new(CREATED_DATE_QUERY)
        }
    }

    /// Set identity
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set timestamp column
    #[inline]
    #[must_use]
    pub fn with_timestamp_attr(mut self, attr: impl Into<String>) -> Self {
        self.timestamp_attr = Some(attr.into());
        self
    }

    /// Set timestamp output name
    #[inline]
    #[must_use]
    pub fn with_rename_timestamp(mut self, field: impl Into<String>) -> Self {
        self.rename_timestamp = Some(field.into());
        self
    }

    /// Set API version override
    #[inline]
    #[must_use]
    pub fn with_api_ver(mut self, api_ver: impl Into<String>) -> Self {
        self.api_ver = Some(api_ver.into());
        self
    }

    /// Set event type override
    #[inline]
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Set compound id fields
    #[inline]
    #[must_use]
    pub fn with_id_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add an `env` binding
    #[inline]
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, expr: impl Into<String>) -> Self {
        self.env.insert(key.into(), expr.into());
        self
    }
}

/// Accepts `api_ver: "58.0"` as well as YAML numbers like `58.0` or `58`
///
/// # Errors
/// Propagates the deserializer error for non-scalar values
pub fn deserialize_api_version<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(i) => format!("{i}.0"),
        Raw::Float(f) => format!("{f:?}"),
    }))
}

/// Piece of scanned template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied verbatim (escapes already collapsed)
    Literal(String),
    /// Named placeholder
    Placeholder(String),
}

/// Template text split into literals and placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTemplate {
    segments: Vec<Segment>,
}

impl ParsedTemplate {
    /// Scan template text
    ///
    /// # Errors
    /// `TemplateError::Malformed` on unterminated, empty, nested or invalid
    /// placeholders and on a stray `}`
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, '{')) => {
                                return Err(TemplateError::malformed(offset, "nested '{'"));
                            }
                            Some((_, ch)) => name.push(ch),
                            None => {
                                return Err(TemplateError::malformed(
                                    offset,
                                    "unterminated placeholder",
                                ));
                            }
                        }
                    }
                    if !is_identifier(&name) {
                        return Err(TemplateError::malformed(
                            offset,
                            format!("invalid placeholder name {name:?}"),
                        ));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::malformed(offset, "unmatched '}'")),
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Scanned segments in order
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Distinct placeholder names in order of first appearance
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Whether the template references `name`
    #[inline]
    #[must_use]
    pub fn references(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(n) if n == name))
    }

    /// Substitute every placeholder through `lookup`
    ///
    /// # Errors
    /// `TemplateError::UnresolvedPlaceholder` for the first name `lookup`
    /// cannot bind
    pub fn render<'a, F>(&self, lookup: F) -> Result<String, TemplateError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = lookup(name).ok_or_else(|| TemplateError::unresolved(name))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn scan_placeholders() {
        let parsed =
            ParsedTemplate::parse("WHERE a>={from_timestamp} AND b<{to_timestamp} AND c>={from_timestamp}")
                .unwrap();
        assert_eq!(parsed.placeholders(), vec!["from_timestamp", "to_timestamp"]);
        assert!(parsed.references("to_timestamp"));
        assert!(!parsed.references("start_date"));
    }

    #[test]
    fn escaped_braces_are_literal() {
        let parsed = ParsedTemplate::parse("{{literal}} {x}").unwrap();
        assert_eq!(parsed.placeholders(), vec!["x"]);
        let out = parsed.render(|_| Some("1")).unwrap();
        assert_eq!(out, "{literal} 1");
    }

    #[test]
    fn malformed_templates() {
        for (text, offset) in [("abc {from", 4), ("{}", 0), ("x {a b}", 2), ("a } b", 2), ("{a{b}}", 0)] {
            match ParsedTemplate::parse(text) {
                Err(TemplateError::Malformed { offset: got, .. }) => {
                    assert_eq!(got, offset, "offset for {text:?}");
                }
                other => panic!("expected malformed for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn render_reports_first_unbound() {
        let parsed = ParsedTemplate::parse("{a} {b} {c}").unwrap();
        let bindings: HashMap<&str, &str> = [("a", "1")].into_iter().collect();
        let err = parsed.render(|n| bindings.get(n).copied()).unwrap_err();
        assert_eq!(err, TemplateError::unresolved("b"));
    }

    #[test]
    fn utf8_literals_survive() {
        let parsed = ParsedTemplate::parse("name = 'Zoë' AND d >= {from}").unwrap();
        let out = parsed.render(|_| Some("X")).unwrap();
        assert_eq!(out, "name = 'Zoë' AND d >= X");
    }

    #[test]
    fn builtin_template_by_date_field() {
        assert!(QueryTemplate::event_log_file("LogDate").text.contains("LogDate>={from_timestamp}"));
        assert!(QueryTemplate::event_log_file("logdate").text.contains("LogDate>="));
        assert!(QueryTemplate::event_log_file("CreatedDate")
            .text
            .contains("CreatedDate>={from_timestamp}"));
    }

    #[test]
    fn deserialize_numeric_api_version() {
        let t: QueryTemplate =
            serde_json::from_str(r#"{"query": "SELECT Id FROM Account", "api_ver": 58.0}"#).unwrap();
        assert_eq!(t.api_ver.as_deref(), Some("58.0"));

        let t: QueryTemplate =
            serde_json::from_str(r#"{"query": "SELECT Id FROM Account", "api_ver": 60}"#).unwrap();
        assert_eq!(t.api_ver.as_deref(), Some("60.0"));

        let t: QueryTemplate =
            serde_json::from_str(r#"{"query": "SELECT Id FROM Account", "api_ver": "59.0"}"#).unwrap();
        assert_eq!(t.api_ver.as_deref(), Some("59.0"));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("from_timestamp"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }
}
