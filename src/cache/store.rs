/*!
 * Durable key/value storage seam.
 *
 * The cache talks to persistent storage only through `KeyValueStore`, so the
 * SQLite backend can be swapped for the in-process `MemoryStore` in tests.
 */

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

/// A value read back from a store, with the time it has left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub value: Vec<u8>,
    pub remaining: Duration,
}

/// Persistent key/value storage with per-entry expiry
///
/// Expired entries are never returned by `get` or `enumerate`.
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a live entry
    async fn get(&self, key: &str) -> Result<Option<StoredValue>>;

    /// Insert or replace an entry that expires after `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove an entry; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Keys of live entries starting with `prefix`, sorted
    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every entry, returning how many were removed
    async fn clear(&self) -> Result<usize> {
        let keys = self.enumerate("").await?;
        for key in &keys {
            self.remove(key).await?;
        }
        Ok(keys.len())
    }
}

/// In-process store, used by tests and when no database is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Ok(Some(StoredValue {
                value: value.clone(),
                remaining: *expires_at - now,
            })),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(key, (_, expires_at))| key.starts_with(prefix) && *expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
