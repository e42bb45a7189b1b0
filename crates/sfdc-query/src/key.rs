//! Query identity for watermark persistence

use crate::template::QueryTemplate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Key a query's watermark is stored under
///
/// `<instance>/<name>` for named templates, otherwise
/// `<instance>/q-<16 hex chars of SHA-256(text)>`. Reordering the query list
/// keeps keys stable; editing an unnamed template's text starts over.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    /// Wrap a raw key
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key for a template of an instance
    #[must_use]
    pub fn for_template(instance: &str, template: &QueryTemplate) -> Self {
        match template.name.as_deref() {
            Some(name) => Self(format!("{instance}/{name}")),
            None => {
                let digest = Sha256::digest(template.text.as_bytes());
                Self(format!("{instance}/q-{}", &hex::encode(digest)[..16]))
            }
        }
    }

    /// Key text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
