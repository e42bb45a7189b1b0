//! Error types for query resolution
//!
//! Provides the error taxonomy for:
//! - Template expansion (per query, never aborts sibling queries)
//! - Window computation (per run, aborts the whole invocation)

/// Errors while expanding a single query template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// Placeholder has neither a standard nor an `env` binding
    #[error("unresolved placeholder '{{{name}}}'")]
    UnresolvedPlaceholder {
        /// Placeholder name without braces
        name: String,
    },

    /// Template text is not well formed
    #[error("malformed template at byte {offset}: {message}")]
    Malformed {
        /// Byte offset into the template text
        offset: usize,
        /// What is wrong at that offset
        message: String,
    },

    /// `env` value does not match the expression grammar
    #[error("malformed env expression for '{key}' ({expr:?}): {message}")]
    MalformedExpression {
        /// `env` key
        key: String,
        /// Expression text as configured
        expr: String,
        /// Parser diagnostic
        message: String,
    },

    /// `env` expression evaluates outside the representable time range
    #[error("env expression for '{key}' is out of range")]
    ExpressionOutOfRange {
        /// `env` key
        key: String,
    },
}

impl TemplateError {
    /// Create malformed template error at byte offset
    pub fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            message: message.into(),
        }
    }

    /// Create unresolved placeholder error
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedPlaceholder { name: name.into() }
    }
}

/// Errors while computing the extraction window
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Window arithmetic left the representable time range
    #[error("time arithmetic out of range: {0}")]
    OutOfRange(String),

    /// Timestamp could not be normalized to UTC
    #[error("invalid timestamp '{value}': {message}")]
    InvalidTimestamp {
        /// Timestamp text as given
        value: String,
        /// Parser diagnostic
        message: String,
    },
}

/// Unrecognized generation interval name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown generation interval '{0}' (expected Hourly or Daily)")]
pub struct UnknownInterval(pub String);

/// Combined resolution error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Template of one query could not be expanded
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Window could not be computed
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
}

impl ResolveError {
    /// Whether the error invalidates every query of the run
    #[inline]
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Clock(_))
    }
}
