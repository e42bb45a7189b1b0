//! Watermark stores
//!
//! A store maps each [`QueryKey`] to the upper bound of its last successful
//! extraction. Commits are monotonic per key.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use sfdc_query::{QueryKey, Watermark};
use std::collections::HashMap;

/// Persistence for per-query watermarks
pub trait WatermarkStore: Send + Sync {
    /// Watermark of a query, `None` before its first successful run
    ///
    /// # Errors
    /// Returns `StoreError` if the backing state cannot be read
    fn load(&self, key: &QueryKey) -> StoreResult<Option<Watermark>>;

    /// Record a new watermark after a successful extraction
    ///
    /// # Errors
    /// Returns `StoreError::Regression` if `watermark` is older than the
    /// stored value, or an IO error if the state cannot be written
    fn commit(&self, key: &QueryKey, watermark: Watermark) -> StoreResult<()>;
}

impl<S: WatermarkStore + ?Sized> WatermarkStore for &S {
    fn load(&self, key: &QueryKey) -> StoreResult<Option<Watermark>> {
        (**self).load(key)
    }

    fn commit(&self, key: &QueryKey, watermark: Watermark) -> StoreResult<()> {
        (**self).commit(key, watermark)
    }
}

pub(crate) fn check_monotonic(
    key: &QueryKey,
    stored: Option<Watermark>,
    attempted: Watermark,
) -> StoreResult<()> {
    match stored {
        Some(stored) if attempted < stored => Err(StoreError::Regression {
            key: key.clone(),
            stored,
            attempted,
        }),
        _ => Ok(()),
    }
}

/// In-process watermark store
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    inner: RwLock<HashMap<QueryKey, Watermark>>,
}

impl MemoryWatermarkStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored watermarks
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no watermark has been committed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl FromIterator<(QueryKey, Watermark)> for MemoryWatermarkStore {
    fn from_iter<I: IntoIterator<Item = (QueryKey, Watermark)>>(iter: I) -> Self {
        Self {
            inner: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn load(&self, key: &QueryKey) -> StoreResult<Option<Watermark>> {
        Ok(self.inner.read().get(key).copied())
    }

    fn commit(&self, key: &QueryKey, watermark: Watermark) -> StoreResult<()> {
        let mut map = self.inner.write();
        check_monotonic(key, map.get(key).copied(), watermark)?;
        map.insert(key.clone(), watermark);
        tracing::debug!(%key, %watermark, "watermark committed");
        Ok(())
    }
}
