/*!
 * Multi-tier cache for detection and translation results.
 *
 * Reads check, in order:
 * - the in-memory LRU tier
 * - the durable `KeyValueStore` (while online)
 * - the offline write queue (while offline)
 *
 * Lower-tier hits are promoted into memory with their remaining TTL. Tier
 * I/O failures are logged and treated as misses, so a broken store never
 * fails a request.
 */

use bytes::Bytes;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app_config::CacheSettings;
use crate::fingerprint::Fingerprint;

pub mod memory;
pub mod offline;
pub mod store;

pub use memory::{Lookup, MemoryTier};
pub use offline::{OfflineQueue, OFFLINE_PREFIX};
pub use store::{KeyValueStore, MemoryStore, StoredValue};

/// Kind of cached data; decides the TTL and the key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataClass {
    Translation,
    Detection,
    Configuration,
}

impl DataClass {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Translation => "tr",
            Self::Detection => "ocr",
            Self::Configuration => "cfg",
        }
    }

    /// Cache key for a fingerprint of this class
    pub fn key(self, fingerprint: Fingerprint) -> String {
        format!("{}:{}", self.prefix(), fingerprint)
    }
}

/// Cache bounds and TTLs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_items: usize,
    pub max_bytes: usize,
    pub translation_ttl: Duration,
    pub detection_ttl: Duration,
    pub configuration_ttl: Duration,
}

impl CacheConfig {
    pub fn ttl(&self, class: DataClass) -> Duration {
        match class {
            DataClass::Translation => self.translation_ttl,
            DataClass::Detection => self.detection_ttl,
            DataClass::Configuration => self.configuration_ttl,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            max_items: settings.max_items,
            max_bytes: settings.max_bytes,
            translation_ttl: Duration::from_secs(settings.translation_ttl_secs),
            detection_ttl: Duration::from_secs(settings.detection_ttl_secs),
            configuration_ttl: Duration::from_secs(settings.configuration_ttl_secs),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub offline_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Writes too large for the memory tier
    pub rejected: u64,
    /// Durable or queue operations that failed and were skipped
    pub tier_errors: u64,
    pub entries: usize,
    pub bytes: usize,
    #[serde(serialize_with = "serialize_ratio")]
    pub hit_rate: f64,
}

fn serialize_ratio<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 1000.0).round() / 1000.0)
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.durable_hits + self.offline_hits
    }
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    offline_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    rejected: AtomicU64,
    tier_errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug)]
struct Inner {
    config: CacheConfig,
    memory: Mutex<MemoryTier>,
    durable: Option<Arc<dyn KeyValueStore>>,
    offline: Option<OfflineQueue>,
    online: AtomicBool,
    counters: Counters,
}

/// Tiered cache handle; clones share the same tiers
#[derive(Debug, Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

impl TieredCache {
    /// Memory-only cache
    pub fn new(config: CacheConfig) -> Self {
        Self::with_tiers(config, None, None)
    }

    /// Cache with optional durable tier and offline queue
    pub fn with_tiers(
        config: CacheConfig,
        durable: Option<Arc<dyn KeyValueStore>>,
        offline: Option<OfflineQueue>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: Mutex::new(MemoryTier::new(config.max_items, config.max_bytes)),
                config,
                durable,
                offline,
                online: AtomicBool::new(true),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    fn tier_error(&self, action: &str, key: &str, error: anyhow::Error) {
        bump(&self.inner.counters.tier_errors);
        warn!("Cache {} failed for {}: {:#}", action, key, error);
    }

    fn promote(&self, key: &str, value: Bytes, remaining: Duration) {
        let outcome = self.inner.memory.lock().insert(key, value, remaining);
        self.inner
            .counters
            .evictions
            .fetch_add(outcome.evicted as u64, Ordering::Relaxed);
    }

    /// Raw payload lookup across all tiers
    pub async fn get_bytes(&self, key: &str) -> Option<Bytes> {
        let counters = &self.inner.counters;

        // Lock scope must end before any await.
        let lookup = self.inner.memory.lock().get(key);
        match lookup {
            Lookup::Hit(value) => {
                bump(&counters.memory_hits);
                return Some(value);
            }
            Lookup::Expired => bump(&counters.expirations),
            Lookup::Miss => {}
        }

        if self.is_online() {
            if let Some(durable) = &self.inner.durable {
                match durable.get(key).await {
                    Ok(Some(stored)) => {
                        bump(&counters.durable_hits);
                        let value = Bytes::from(stored.value);
                        self.promote(key, value.clone(), stored.remaining);
                        return Some(value);
                    }
                    Ok(None) => {}
                    Err(e) => self.tier_error("read", key, e),
                }
            }
        } else if let Some(offline) = &self.inner.offline {
            match offline.get(key).await {
                Ok(Some((value, remaining))) => {
                    bump(&counters.offline_hits);
                    let value = Bytes::from(value);
                    self.promote(key, value.clone(), remaining);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => self.tier_error("queue read", key, e),
            }
        }

        bump(&counters.misses);
        None
    }

    /// Typed lookup; undecodable payloads are dropped and count as misses
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get_bytes(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Dropping undecodable cache entry {}: {}", key, e);
                self.remove(key).await;
                None
            }
        }
    }

    /// Write a raw payload to every applicable tier
    pub async fn put_bytes(&self, key: &str, value: Bytes, class: DataClass) {
        let counters = &self.inner.counters;
        let ttl = self.inner.config.ttl(class);
        bump(&counters.writes);

        let outcome = self.inner.memory.lock().insert(key, value.clone(), ttl);
        counters
            .evictions
            .fetch_add(outcome.evicted as u64, Ordering::Relaxed);
        if !outcome.admitted {
            bump(&counters.rejected);
            debug!("Entry {} ({} bytes) exceeds the memory budget", key, value.len());
        }

        if self.is_online() {
            if let Some(durable) = &self.inner.durable {
                if let Err(e) = durable.set(key, value.to_vec(), ttl).await {
                    self.tier_error("write", key, e);
                }
            }
        } else if let Some(offline) = &self.inner.offline {
            if let Err(e) = offline.enqueue(key, &value, ttl).await {
                self.tier_error("enqueue", key, e);
            }
        }
    }

    /// Typed write; values that cannot be encoded are not cached
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, class: DataClass) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.put_bytes(key, Bytes::from(bytes), class).await,
            Err(e) => warn!("Not caching {}: {}", key, e),
        }
    }

    /// Remove a key from every tier
    pub async fn remove(&self, key: &str) {
        self.inner.memory.lock().remove(key);
        if let Some(durable) = &self.inner.durable {
            if let Err(e) = durable.remove(key).await {
                self.tier_error("remove", key, e);
            }
        }
        if let Some(offline) = &self.inner.offline {
            if let Err(e) = offline.remove(key).await {
                self.tier_error("queue remove", key, e);
            }
        }
    }

    /// Empty the memory tier and the durable tier
    pub async fn clear(&self) -> usize {
        let mut removed = {
            let mut memory = self.inner.memory.lock();
            let count = memory.len();
            memory.clear();
            count
        };
        if let Some(durable) = &self.inner.durable {
            match durable.clear().await {
                Ok(count) => removed += count,
                Err(e) => self.tier_error("clear", "*", e),
            }
        }
        removed
    }

    /// Mark the durable tier reachable or not
    ///
    /// Going online replays queued writes and returns how many were replayed.
    pub async fn set_online(&self, online: bool) -> usize {
        let was_online = self.inner.online.swap(online, Ordering::AcqRel);
        if !online || was_online {
            if !online && was_online {
                debug!("Cache offline; queueing durable writes");
            }
            return 0;
        }

        let (Some(offline), Some(durable)) = (&self.inner.offline, &self.inner.durable) else {
            return 0;
        };
        match offline.replay(durable.as_ref()).await {
            Ok(count) => count,
            Err(e) => {
                self.tier_error("replay", OFFLINE_PREFIX, e);
                0
            }
        }
    }

    /// Drop expired memory entries now
    pub fn sweep(&self) -> usize {
        let expired = self.inner.memory.lock().sweep();
        self.inner
            .counters
            .expirations
            .fetch_add(expired as u64, Ordering::Relaxed);
        expired
    }

    /// Run `sweep` every `interval` until `token` is cancelled
    pub fn spawn_sweeper(&self, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = cache.sweep();
                        if expired > 0 {
                            debug!("Cache sweep removed {} expired entries", expired);
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        let (entries, bytes) = {
            let memory = self.inner.memory.lock();
            (memory.len(), memory.bytes())
        };

        let mut stats = CacheStats {
            memory_hits: c.memory_hits.load(Ordering::Relaxed),
            durable_hits: c.durable_hits.load(Ordering::Relaxed),
            offline_hits: c.offline_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            tier_errors: c.tier_errors.load(Ordering::Relaxed),
            entries,
            bytes,
            hit_rate: 0.0,
        };
        let lookups = stats.hits() + stats.misses;
        if lookups > 0 {
            stats.hit_rate = stats.hits() as f64 / lookups as f64;
        }
        stats
    }
}
