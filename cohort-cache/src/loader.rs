//! Cache-coalescing loader.
//!
//! Every backend read in the dashboard client goes through
//! [`CoalescingLoader::get_or_load`]. Per key the loader guarantees:
//!
//! - a fresh entry is served without calling the backend;
//! - at most one backend call is outstanding, later callers attach to it;
//! - a failed call leaves no entry behind, so the next read retries.
//!
//! Retry policy and timeouts are the caller's and the transport's concern.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cohort_core::{LoadError, OrchestrationConfig, DEFAULT_CACHE_TTL_MS};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::entry::{downcast, CacheEntry, CacheRead, ReadSource, SharedValue};
use crate::key::CacheKey;
use crate::stats::{CacheStats, StatsCounters};

type LoadResult = Result<SharedValue, LoadError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// Configuration for the coalescing loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Age at which an entry stops being served.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl From<&OrchestrationConfig> for CacheConfig {
    fn from(config: &OrchestrationConfig) -> Self {
        Self::new().with_ttl(config.cache_ttl())
    }
}

struct InFlight {
    id: u64,
    future: SharedLoad,
}

#[derive(Default)]
struct LoaderState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    next_id: u64,
}

struct LoaderInner {
    state: Mutex<LoaderState>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    counters: StatsCounters,
}

impl LoaderInner {
    fn state(&self) -> MutexGuard<'_, LoaderState> {
        // Critical sections never panic midway, so a poisoned map is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("loader state lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Runs exactly once per backend call, before any waiter observes the result.
    fn settle(&self, key: &CacheKey, id: u64, result: &LoadResult) {
        let now = self.clock.now_ms();
        let mut state = self.state();
        let owned = state.in_flight.get(key).is_some_and(|f| f.id == id);
        if owned {
            state.in_flight.remove(key);
        }
        match result {
            Ok(value) => {
                if owned {
                    state
                        .entries
                        .insert(key.clone(), CacheEntry::new(key.clone(), value.clone(), now));
                }
                debug!(key = %key, "cache load settled");
            }
            Err(err) => {
                StatsCounters::bump(&self.counters.failures);
                warn!(key = %key, error = %err, "cache load failed");
            }
        }
    }
}

/// Process-wide keyed cache with in-flight request deduplication.
///
/// Cloning is cheap and every clone shares the same tables.
#[derive(Clone)]
pub struct CoalescingLoader {
    inner: Arc<LoaderInner>,
}

impl CoalescingLoader {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                state: Mutex::new(LoaderState::default()),
                config,
                clock,
                counters: StatsCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Return the value for `key`, loading it with `loader` when needed.
    ///
    /// `force_refresh` skips the entry lookup but still attaches to a call
    /// already in flight for the key.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &CacheKey,
        loader: F,
        force_refresh: bool,
    ) -> Result<T, LoadError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        self.read(key, loader, force_refresh)
            .await
            .map(CacheRead::into_value)
    }

    /// Like [`get_or_load`](Self::get_or_load), reporting how the read was served.
    pub async fn read<T, F, Fut>(
        &self,
        key: &CacheKey,
        loader: F,
        force_refresh: bool,
    ) -> Result<CacheRead<T>, LoadError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        let (future, source) = {
            let now = self.inner.clock.now_ms();
            let mut state = self.inner.state();

            if !force_refresh {
                if let Some(entry) = state.entries.get(key) {
                    if entry.is_fresh(now, self.inner.config.ttl) {
                        StatsCounters::bump(&self.inner.counters.hits);
                        debug!(key = %key, "cache hit");
                        let value = downcast::<T>(key, entry.value())?;
                        return Ok(CacheRead::new(value, ReadSource::Cache, entry.stored_at_ms()));
                    }
                }
            }

            if let Some(pending) = state.in_flight.get(key) {
                StatsCounters::bump(&self.inner.counters.coalesced);
                debug!(key = %key, "attaching to in-flight load");
                (pending.future.clone(), ReadSource::Coalesced)
            } else {
                StatsCounters::bump(&self.inner.counters.misses);
                debug!(key = %key, force_refresh, "cache miss, loading");
                let id = state.next_id;
                state.next_id += 1;
                let future = self.start_load(key.clone(), id, loader());
                state.in_flight.insert(
                    key.clone(),
                    InFlight {
                        id,
                        future: future.clone(),
                    },
                );
                (future, ReadSource::Loaded)
            }
        };

        let value = future.await?;
        let typed = downcast::<T>(key, &value)?;
        Ok(CacheRead::new(typed, source, self.inner.clock.now_ms()))
    }

    fn start_load<T, Fut>(&self, key: CacheKey, id: u64, load: Fut) -> SharedLoad
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let future = async move {
            let result = load.await.map(|value| Arc::new(value) as SharedValue);
            inner.settle(&key, id, &result);
            result
        }
        .boxed()
        .shared();

        // Keep the call progressing when every waiter loses interest.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(future.clone().map(|_| ()));
        }
        future
    }

    /// Fresh value for `key`, if one is stored and has the requested type.
    pub fn peek<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + 'static,
    {
        let now = self.inner.clock.now_ms();
        let state = self.inner.state();
        state
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.inner.config.ttl))
            .and_then(|entry| downcast::<T>(key, entry.value()).ok())
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.state().in_flight.contains_key(key)
    }

    /// Remove one entry. In-flight calls are left alone.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.inner.state().entries.remove(key).is_some();
        if removed {
            StatsCounters::bump(&self.inner.counters.invalidations);
            debug!(key = %key, "cache entry invalidated");
        }
        removed
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.inner.state();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - state.entries.len();
        StatsCounters::add(&self.inner.counters.invalidations, removed as u64);
        debug!(prefix, removed, "cache prefix invalidated");
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state();
        let removed = state.entries.len();
        state.entries.clear();
        StatsCounters::add(&self.inner.counters.invalidations, removed as u64);
        debug!(removed, "cache cleared");
        removed
    }

    /// Drop entries that have outlived the TTL.
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let ttl = self.inner.config.ttl;
        let mut state = self.inner.state();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_fresh(now, ttl));
        before - state.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state();
        self.inner
            .counters
            .snapshot(state.entries.len(), state.in_flight.len())
    }
}

impl std::fmt::Debug for CoalescingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingLoader")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
