//! Artifact cache — TTL- and size-bounded, LRU by access time.
//!
//! - `store` — the [`CacheStore`] with accounting, eviction and stats
//! - `backend` — the [`CacheBackend`] persistence seam plus [`MemoryBackend`]
//! - `hash` — sampled content hashing and composite key builders

pub mod backend;
pub mod hash;
pub mod store;

pub use backend::{CacheBackend, MemoryBackend};
pub use hash::{content_hash, processed_key, translation_key};
pub use store::{CacheEntry, CacheStats, CacheStore};
