//! Cache layer with request coalescing for the dashboard client.
//!
//! All data-fetching code shares one [`CoalescingLoader`]. It combines a
//! TTL cache keyed by [`CacheKey`] with an in-flight table, so concurrent
//! readers of the same key share a single backend call and a failed call
//! never leaves a poisoned entry behind.
//!
//! # Example
//!
//! ```ignore
//! let loader = CoalescingLoader::new(CacheConfig::default());
//! let key = CacheKey::scoped("community-summary", &community_id);
//!
//! // Concurrent callers coalesce; later callers hit the cache until the TTL passes.
//! let summary = loader
//!     .get_or_load(&key, || service.community_summary(community_id), false)
//!     .await?;
//!
//! // Drop one entry so the next read goes back to the backend.
//! loader.invalidate(&key);
//! ```

pub mod clock;
pub mod entry;
pub mod key;
pub mod loader;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, CacheRead, ReadSource};
pub use key::CacheKey;
pub use loader::{CacheConfig, CoalescingLoader};
pub use stats::CacheStats;
