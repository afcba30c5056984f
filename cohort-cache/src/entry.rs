//! Cache entries and read results.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use cohort_core::LoadError;

use crate::key::CacheKey;

/// Type-erased cached value, shared between the entry and every reader.
pub(crate) type SharedValue = Arc<dyn Any + Send + Sync>;

/// One stored result. At most one exists per key.
#[derive(Clone)]
pub struct CacheEntry {
    key: CacheKey,
    value: SharedValue,
    stored_at_ms: i64,
}

impl CacheEntry {
    pub(crate) fn new(key: CacheKey, value: SharedValue, stored_at_ms: i64) -> Self {
        Self {
            key,
            value,
            stored_at_ms,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn stored_at_ms(&self) -> i64 {
        self.stored_at_ms
    }

    /// Valid iff `now - stored_at < ttl`.
    pub fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) < ttl.as_millis() as i64
    }

    pub(crate) fn value(&self) -> &SharedValue {
        &self.value
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("stored_at_ms", &self.stored_at_ms)
            .finish_non_exhaustive()
    }
}

pub(crate) fn downcast<T>(key: &CacheKey, value: &SharedValue) -> Result<T, LoadError>
where
    T: Clone + 'static,
{
    (**value)
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| LoadError::TypeMismatch {
            key: key.to_string(),
        })
}

/// How a read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from a fresh entry, no backend call.
    Cache,
    /// This caller started the backend call.
    Loaded,
    /// This caller attached to a call someone else started.
    Coalesced,
}

/// Result of a loader read, carrying where the value came from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    source: ReadSource,
    stored_at_ms: i64,
}

impl<T> CacheRead<T> {
    pub(crate) fn new(value: T, source: ReadSource, stored_at_ms: i64) -> Self {
        Self {
            value,
            source,
            stored_at_ms,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn was_coalesced(&self) -> bool {
        self.source == ReadSource::Coalesced
    }

    /// Timestamp of the entry (hit) or of settlement (load).
    pub fn stored_at_ms(&self) -> i64 {
        self.stored_at_ms
    }

    /// Age of the value relative to `now_ms`.
    pub fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.stored_at_ms).max(0) as u64)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            source: self.source,
            stored_at_ms: self.stored_at_ms,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
