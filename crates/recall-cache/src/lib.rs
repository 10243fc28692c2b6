//! recall-cache
//!
//! Semantic result cache for the hybrid search service. A lookup first tries
//! the exact fingerprint of the normalized query text, then falls back to the
//! most similar cached query embedding above a cosine threshold. Entries expire
//! after a TTL and the cache is capped at a fixed entry count, reclaiming
//! expired entries before evicting the least recently used ones.

mod cache;
mod clock;
mod fingerprint;
mod stats;

#[cfg(feature = "test-util")]
pub use cache::BucketHold;
pub use cache::{CacheHit, SemanticCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::Fingerprint;
pub use stats::CacheStats;
