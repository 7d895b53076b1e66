//! Size-weighted LRU cache with per-entry TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::backend::{CacheBackend, MemoryBackend};
use super::hash::{processed_key, translation_key};
use crate::config::CacheConfig;

/// What is written to the backing store for each key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl CacheEntry {
    /// Time left before expiry as of `now`, or `None` if already expired.
    fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let age_ms = now
            .signed_duration_since(self.timestamp)
            .num_milliseconds()
            .max(0) as u64;
        self.ttl_ms
            .checked_sub(age_ms)
            .filter(|left| *left > 0)
            .map(Duration::from_millis)
    }
}

/// In-memory accounting for one indexed entry.
#[derive(Debug, Clone)]
struct EntryMeta {
    size: usize,
    expires_at: Instant,
    last_accessed: Instant,
    /// Logical access clock; orders entries for LRU even when timestamps tie.
    access_seq: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    latency_total: Duration,
    latency_samples: u64,
}

struct CacheState {
    index: HashMap<String, EntryMeta>,
    total_size: usize,
    next_seq: u64,
    counters: Counters,
}

impl CacheState {
    fn touch(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn forget(&mut self, key: &str) -> Option<EntryMeta> {
        let meta = self.index.remove(key)?;
        self.total_size -= meta.size;
        Some(meta)
    }

    fn least_recently_used(&self) -> Option<String> {
        self.index
            .iter()
            .min_by_key(|(_, meta)| meta.access_seq)
            .map(|(key, _)| key.clone())
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub total_size: usize,
    pub max_size: usize,
    pub evictions: u64,
    pub expirations: u64,
    pub average_latency: Duration,
    pub hit_rate: f64,
}

/// TTL- and size-bounded key/value store memoizing processed artifacts.
///
/// Values are JSON. The estimated size of an entry is twice its serialized
/// length (a conservative wide-character estimate). After any `set` the total
/// estimated size is at most `max_size_bytes`.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    max_size: usize,
    state: Mutex<CacheState>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            ttl: config.ttl,
            max_size: config.max_size_bytes,
            state: Mutex::new(CacheState {
                index: HashMap::new(),
                total_size: 0,
                next_seq: 0,
                counters: Counters::default(),
            }),
        }
    }

    /// Cache backed by a fresh [`MemoryBackend`].
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Estimated size of a value in bytes.
    pub fn estimate_size(value: &serde_json::Value) -> usize {
        value.to_string().len() * 2
    }

    /// Look up `key`. Expired entries are removed and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let started = Instant::now();
        let mut state = self.state.lock().await;
        let value = self.lookup(&mut state, key).await;

        let counters = &mut state.counters;
        if value.is_some() {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        counters.latency_total += started.elapsed();
        counters.latency_samples += 1;
        value
    }

    async fn lookup(&self, state: &mut CacheState, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();

        if let Some(meta) = state.index.get(key) {
            if meta.expires_at <= now {
                state.forget(key);
                state.counters.expirations += 1;
                self.remove_from_backend(key).await;
                debug!(key, "Cache entry expired");
                return None;
            }

            return match self.read_backend(key).await {
                Some(entry) => {
                    let seq = state.touch();
                    if let Some(meta) = state.index.get_mut(key) {
                        meta.last_accessed = now;
                        meta.access_seq = seq;
                    }
                    Some(entry.value)
                }
                None => {
                    // Backend lost or failed to read it; drop the stale index entry.
                    state.forget(key);
                    None
                }
            };
        }

        // Not indexed: the backend may hold an entry persisted by an earlier session.
        let entry = self.read_backend(key).await?;
        let Some(remaining) = entry.remaining(Utc::now()) else {
            state.counters.expirations += 1;
            self.remove_from_backend(key).await;
            return None;
        };

        let size = Self::estimate_size(&entry.value);
        if size <= self.max_size {
            self.make_room(state, size).await;
            let seq = state.touch();
            state.index.insert(
                key.to_string(),
                EntryMeta {
                    size,
                    expires_at: now + remaining,
                    last_accessed: now,
                    access_seq: seq,
                },
            );
            state.total_size += size;
        }
        Some(entry.value)
    }

    /// Store `value` under `key`. Returns `false` when the value was not
    /// stored (larger than the ceiling, or the backend refused it).
    pub async fn set(&self, key: &str, value: serde_json::Value) -> bool {
        let size = Self::estimate_size(&value);
        if size > self.max_size {
            warn!(
                key,
                size,
                max_size = self.max_size,
                "Cache entry larger than ceiling, not stored"
            );
            return false;
        }

        let entry = CacheEntry {
            key: key.to_string(),
            value,
            timestamp: Utc::now(),
            ttl_ms: self.ttl.as_millis() as u64,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return false;
            }
        };

        let mut state = self.state.lock().await;
        // A failed write leaves both the index and the previous value intact.
        if let Err(e) = self.backend.set(key, raw).await {
            warn!(key, error = %e, "Cache backend write failed");
            return false;
        }
        state.forget(key);
        self.make_room(&mut state, size).await;

        let now = Instant::now();
        let seq = state.touch();
        state.index.insert(
            key.to_string(),
            EntryMeta {
                size,
                expires_at: now + self.ttl,
                last_accessed: now,
                access_seq: seq,
            },
        );
        state.total_size += size;
        true
    }

    /// Evict least-recently-accessed entries until `incoming` bytes fit.
    async fn make_room(&self, state: &mut CacheState, incoming: usize) {
        while state.total_size + incoming > self.max_size {
            let Some(victim) = state.least_recently_used() else {
                break;
            };
            if let Some(meta) = state.forget(&victim) {
                state.counters.evictions += 1;
                debug!(key = %victim, size = meta.size, "Evicted cache entry");
            }
            self.remove_from_backend(&victim).await;
        }
    }

    pub async fn remove(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.forget(key);
        self.remove_from_backend(key).await;
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.index.clear();
        state.total_size = 0;
        if let Err(e) = self.backend.clear().await {
            warn!(error = %e, "Cache backend clear failed");
        }
    }

    /// Drop every expired indexed entry. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = state
            .index
            .iter()
            .filter(|(_, meta)| meta.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.forget(key);
            self.remove_from_backend(key).await;
        }
        state.counters.expirations += expired.len() as u64;
        expired.len()
    }

    async fn read_backend(&self, key: &str) -> Option<CacheEntry> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key, error = %e, "Corrupt cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache backend read failed, treating as miss");
                None
            }
        }
    }

    async fn remove_from_backend(&self, key: &str) {
        if let Err(e) = self.backend.remove(key).await {
            warn!(key, error = %e, "Cache backend remove failed");
        }
    }

    // ── Typed helpers ───────────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, json).await,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize value for cache");
                false
            }
        }
    }

    /// Look up an artifact under `processed:{hash}:{op_type}:{parameter}`.
    pub async fn get_cached_processed_content<T: DeserializeOwned>(
        &self,
        content_hash: &str,
        op_type: &str,
        parameter: &str,
    ) -> Option<T> {
        self.get_json(&processed_key(content_hash, op_type, parameter))
            .await
    }

    pub async fn set_cached_processed_content<T: Serialize>(
        &self,
        content_hash: &str,
        op_type: &str,
        parameter: &str,
        value: &T,
    ) -> bool {
        self.set_json(&processed_key(content_hash, op_type, parameter), value)
            .await
    }

    pub async fn get_cached_translation(
        &self,
        content_hash: &str,
        from: &str,
        to: &str,
    ) -> Option<String> {
        self.get_json(&translation_key(content_hash, from, to)).await
    }

    pub async fn set_cached_translation(
        &self,
        content_hash: &str,
        from: &str,
        to: &str,
        translated: &str,
    ) -> bool {
        self.set_json(&translation_key(content_hash, from, to), &translated)
            .await
    }

    // ── Introspection ───────────────────────────────────────────────

    pub async fn len(&self) -> usize {
        self.state.lock().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.index.is_empty()
    }

    pub async fn total_size(&self) -> usize {
        self.state.lock().await.total_size
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.index.contains_key(key)
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let c = &state.counters;
        let lookups = c.hits + c.misses;
        CacheStats {
            hits: c.hits,
            misses: c.misses,
            entries: state.index.len(),
            total_size: state.total_size,
            max_size: self.max_size,
            evictions: c.evictions,
            expirations: c.expirations,
            average_latency: if c.latency_samples == 0 {
                Duration::ZERO
            } else {
                c.latency_total / c.latency_samples as u32
            },
            hit_rate: if lookups == 0 {
                0.0
            } else {
                c.hits as f64 / lookups as f64
            },
        }
    }
}
