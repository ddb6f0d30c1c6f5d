/*!
 * In-memory LRU tier bounded by entry count and by payload bytes.
 */

use bytes::Bytes;
use lru::LruCache;
use std::time::Duration;
use tokio::time::Instant;

/// A cached payload owned by the memory tier
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Bytes,
    pub inserted_at: Instant,
    pub ttl: Duration,
    pub access_count: u64,
}

impl CacheEntry {
    fn new(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
            access_count: 0,
        }
    }

    /// Expired from `inserted_at + ttl` on
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }

    /// Time left before expiry
    pub fn remaining(&self, now: Instant) -> Duration {
        self.ttl.saturating_sub(now.duration_since(self.inserted_at))
    }
}

/// Result of a memory-tier lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Bytes),
    Expired,
    Miss,
}

/// What an insert did to the tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Whether the entry now lives in the tier
    pub admitted: bool,
    /// Entries evicted to make room
    pub evicted: usize,
}

/// LRU memory tier; both bounds are hard limits
#[derive(Debug)]
pub struct MemoryTier {
    entries: LruCache<String, CacheEntry>,
    max_items: usize,
    max_bytes: usize,
    bytes: usize,
}

impl MemoryTier {
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_items,
            max_bytes,
            bytes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes held
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Look up a key, dropping it if it has expired
    pub fn get(&mut self, key: &str) -> Lookup {
        let now = Instant::now();
        let expired = match self.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.access_count += 1;
                return Lookup::Hit(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove(key);
            Lookup::Expired
        } else {
            Lookup::Miss
        }
    }

    /// Access count of a live entry, without touching recency
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.entries.peek(key).map(|entry| entry.access_count)
    }

    /// Insert or replace an entry, then evict until both bounds hold
    pub fn insert(&mut self, key: &str, value: Bytes, ttl: Duration) -> InsertOutcome {
        // Replacing always drops the old payload, even if the new one is refused.
        self.remove(key);

        if value.len() > self.max_bytes || self.max_items == 0 {
            return InsertOutcome::default();
        }

        self.bytes += value.len();
        self.entries.put(key.to_string(), CacheEntry::new(value, ttl));

        let mut evicted = 0;
        while self.entries.len() > self.max_items || self.bytes > self.max_bytes {
            match self.entries.pop_lru() {
                Some((_, entry)) => {
                    self.bytes -= entry.value.len();
                    evicted += 1;
                }
                None => break,
            }
        }

        InsertOutcome {
            admitted: true,
            evicted,
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.bytes -= entry.value.len();
                true
            }
            None => false,
        }
    }

    /// Remove every expired entry, returning how many went
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}
