//! Record deduplication cache
//!
//! Remembers which record ids were already forwarded so overlapping
//! extractions do not emit duplicates. Ids are scoped: event queries use the
//! query key, log files use their file id.

use moka::sync::Cache;
use std::time::Duration;

/// Upper bound on remembered ids
pub const DEFAULT_MAX_ENTRIES: u64 = 1_000_000;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Seen-id cache consulted by record shaping
pub trait DedupCache: Send + Sync {
    /// Record `id` under `scope`, returning whether it was already present
    fn check_and_record(&self, scope: &str, id: &str) -> bool;

    /// Whether `id` is recorded under `scope`
    fn contains(&self, scope: &str, id: &str) -> bool;

    /// Record `id` under `scope`
    fn record(&self, scope: &str, id: &str);
}

/// In-process TTL cache backed by moka
#[derive(Debug, Clone)]
pub struct MemoryDedupCache {
    inner: Cache<(String, String), ()>,
}

impl MemoryDedupCache {
    /// Create cache whose entries expire after `ttl`
    #[must_use]
    pub fn with_ttl(max_entries: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Create cache whose entries expire after `days`
    #[inline]
    #[must_use]
    pub fn for_days(days: u32) -> Self {
        Self::with_ttl(
            DEFAULT_MAX_ENTRIES,
            Duration::from_secs(u64::from(days) * SECONDS_PER_DAY),
        )
    }

    fn key(scope: &str, id: &str) -> (String, String) {
        (scope.to_string(), id.to_string())
    }
}

impl DedupCache for MemoryDedupCache {
    fn check_and_record(&self, scope: &str, id: &str) -> bool {
        !self.inner.entry(Self::key(scope, id)).or_insert(()).is_fresh()
    }

    fn contains(&self, scope: &str, id: &str) -> bool {
        self.inner.get(&Self::key(scope, id)).is_some()
    }

    fn record(&self, scope: &str, id: &str) {
        self.inner.insert(Self::key(scope, id), ());
    }
}
