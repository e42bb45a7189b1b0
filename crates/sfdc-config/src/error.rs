//! Error types for configuration loading
//!
//! Every variant is fatal at startup: it surfaces before any query runs.

use std::path::PathBuf;

/// Errors while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading a configuration or query file
    #[error("io error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid YAML or does not match the schema
    #[error("invalid configuration in {path}: {source}")]
    Yaml {
        /// File being parsed
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_yaml::Error,
    },

    /// Required instance setting absent
    #[error("please specify a \"{key}\" parameter for instance \"{instance}\"")]
    MissingSetting {
        /// Instance name
        instance: String,
        /// Setting name
        key: &'static str,
    },

    /// Setting present but unusable
    #[error("invalid \"{key}\" for instance \"{instance}\": {message}")]
    InvalidSetting {
        /// Instance name
        instance: String,
        /// Setting name
        key: &'static str,
        /// Why the value was rejected
        message: String,
    },

    /// Query files reference each other
    #[error("query file include cycle: {}", display_chain(.chain))]
    IncludeCycle {
        /// Files in include order, ending with the repeated one
        chain: Vec<PathBuf>,
    },

    /// Configuration declares no instances
    #[error("no instances configured")]
    NoInstances,

    /// Two instances share a name
    #[error("duplicate instance name \"{0}\"")]
    DuplicateInstance(String),

    /// Two queries of one instance share a watermark key
    #[error("duplicate query key \"{key}\" in instance \"{instance}\"")]
    DuplicateQuery {
        /// Instance name
        instance: String,
        /// Repeated watermark key
        key: String,
    },
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create YAML error for path
    pub fn yaml_error(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.into(),
            source,
        }
    }

    /// Create invalid setting error
    pub fn invalid(instance: impl Into<String>, key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            instance: instance.into(),
            key,
            message: message.into(),
        }
    }
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
