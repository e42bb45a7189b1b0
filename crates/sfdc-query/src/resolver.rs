//! Query Resolver
//!
//! Expands one [`QueryTemplate`] into executable SOQL for the current run.
//!
//! # Workflow
//! 1. Compute the extraction window from the watermark, lag and clock
//! 2. Bind `from_timestamp`, `to_timestamp`, `log_interval_type`
//! 3. Evaluate `env` expressions (they shadow standard bindings)
//! 4. Substitute placeholders; unbound names fail the query
//! 5. Cascade per-query overrides into an [`EffectiveQuery`]
//!
//! Resolution is pure: persisting the candidate watermark is the caller's job
//! and only happens after the query executed successfully.

use crate::effective::{EffectiveQuery, InstanceDefaults};
use crate::error::{ResolveError, TemplateError};
use crate::expr::EnvExpr;
use crate::template::{ParsedTemplate, QueryTemplate};
use crate::window::{format_timestamp, ExtractionWindow, Watermark};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// Standard binding for the window's lower bound
pub const FROM_TIMESTAMP: &str = "from_timestamp";
/// Standard binding for the window's upper bound
pub const TO_TIMESTAMP: &str = "to_timestamp";
/// Standard binding for the instance generation interval
pub const LOG_INTERVAL_TYPE: &str = "log_interval_type";

/// Fully substituted query ready for execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedQuery {
    query: String,
    #[serde(flatten)]
    effective: EffectiveQuery,
    window: ExtractionWindow,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unused_env: Vec<String>,
}

impl ResolvedQuery {
    /// Substituted SOQL text
    #[inline]
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Overrides in force for this query
    #[inline]
    #[must_use]
    pub fn effective(&self) -> &EffectiveQuery {
        &self.effective
    }

    /// Effective API version
    #[inline]
    #[must_use]
    pub fn api_ver(&self) -> &str {
        &self.effective.api_ver
    }

    /// Effective timestamp column
    #[inline]
    #[must_use]
    pub fn timestamp_attr(&self) -> &str {
        &self.effective.timestamp_attr
    }

    /// Timestamp rename target, if any
    #[inline]
    #[must_use]
    pub fn rename_timestamp(&self) -> Option<&str> {
        self.effective.rename_timestamp.as_deref()
    }

    /// Window the query covers
    #[inline]
    #[must_use]
    pub fn window(&self) -> &ExtractionWindow {
        &self.window
    }

    /// Watermark to commit after successful execution
    #[inline]
    #[must_use]
    pub fn candidate_watermark(&self) -> Watermark {
        self.window.next_watermark()
    }

    /// `env` keys the template never references
    #[inline]
    #[must_use]
    pub fn unused_env(&self) -> &[String] {
        &self.unused_env
    }

    /// REST path for the query endpoint
    ///
    /// Spaces in the query become `+`, as the query endpoint expects.
    #[must_use]
    pub fn request_path(&self) -> String {
        format!(
            "/services/data/v{}/query?q={}",
            self.effective.api_ver,
            self.query.replace(' ', "+")
        )
    }
}

/// Resolves templates against one instance's defaults
#[derive(Debug, Clone)]
pub struct QueryResolver {
    defaults: InstanceDefaults,
}

impl QueryResolver {
    /// Create resolver for an instance
    #[inline]
    #[must_use]
    pub fn new(defaults: InstanceDefaults) -> Self {
        Self { defaults }
    }

    /// Instance defaults in use
    #[inline]
    #[must_use]
    pub fn defaults(&self) -> &InstanceDefaults {
        &self.defaults
    }

    /// Resolve one template
    ///
    /// # Arguments
    /// * `template` - Template with its overrides
    /// * `watermark` - Prior watermark for this query, `None` on first run
    /// * `now` - Time of the run, shared by every query of the run
    ///
    /// # Errors
    /// - `ResolveError::Clock` if the window cannot be computed (run-fatal)
    /// - `ResolveError::Template` if the template or an `env` expression is
    ///   malformed, or a placeholder is unbound (fatal for this query only)
    pub fn resolve(
        &self,
        template: &QueryTemplate,
        watermark: Option<&Watermark>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedQuery, ResolveError> {
        let window = ExtractionWindow::compute(&self.defaults, watermark, now)?;
        let parsed = ParsedTemplate::parse(&template.text)?;
        let bindings = self.bindings(template, &window, now)?;

        let query = parsed.render(|name| bindings.get(name).map(String::as_str))?;

        let unused_env: Vec<String> = template
            .env
            .keys()
            .filter(|key| !parsed.references(key))
            .cloned()
            .collect();
        for key in &unused_env {
            tracing::warn!(
                instance = %self.defaults.name,
                env_key = %key,
                "env binding is never referenced by the query"
            );
        }

        tracing::debug!(
            instance = %self.defaults.name,
            window = %window,
            "resolved query"
        );

        Ok(ResolvedQuery {
            query,
            effective: EffectiveQuery::resolve(template, &self.defaults),
            window,
            unused_env,
        })
    }

    fn bindings(
        &self,
        template: &QueryTemplate,
        window: &ExtractionWindow,
        now: DateTime<Utc>,
    ) -> Result<IndexMap<String, String>, TemplateError> {
        let mut bindings = IndexMap::new();
        bindings.insert(FROM_TIMESTAMP.to_string(), format_timestamp(window.from()));
        bindings.insert(TO_TIMESTAMP.to_string(), format_timestamp(window.to()));
        bindings.insert(
            LOG_INTERVAL_TYPE.to_string(),
            self.defaults.generation_interval.as_str().to_string(),
        );

        for (key, raw) in &template.env {
            let expr = EnvExpr::parse(raw).map_err(|e| TemplateError::MalformedExpression {
                key: key.clone(),
                expr: raw.clone(),
                message: e.to_string(),
            })?;
            let at = expr
                .evaluate(now)
                .ok_or_else(|| TemplateError::ExpressionOutOfRange { key: key.clone() })?;
            if key == FROM_TIMESTAMP || key == TO_TIMESTAMP {
                tracing::warn!(
                    instance = %self.defaults.name,
                    env_key = %key,
                    "env binding shadows the computed window; the watermark still follows the window"
                );
            }
            bindings.insert(key.clone(), format_timestamp(at));
        }
        Ok(bindings)
    }
}
