/*!
 * Queue of cache writes made while the durable tier is unreachable.
 */

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::store::KeyValueStore;

/// Namespace of queued writes inside the queue's store
pub const OFFLINE_PREFIX: &str = "offline:";

/// A write waiting for the durable tier
#[derive(Debug, Serialize, Deserialize)]
struct QueuedWrite {
    value: Vec<u8>,
}

/// Offline write queue, persisted in its own store under `offline:`
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn queue_key(key: &str) -> String {
        format!("{}{}", OFFLINE_PREFIX, key)
    }

    /// Queue a write; a later write to the same key replaces it
    pub async fn enqueue(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let record = serde_json::to_vec(&QueuedWrite {
            value: value.to_vec(),
        })
        .context("Failed to encode queued write")?;
        self.store.set(&Self::queue_key(key), record, ttl).await
    }

    /// Read a queued value, so reads stay consistent while offline
    pub async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Duration)>> {
        match self.store.get(&Self::queue_key(key)).await? {
            Some(stored) => {
                let record: QueuedWrite = serde_json::from_slice(&stored.value)
                    .context("Failed to decode queued write")?;
                Ok(Some((record.value, stored.remaining)))
            }
            None => Ok(None),
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(&Self::queue_key(key)).await
    }

    /// Number of queued writes still alive
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.enumerate(OFFLINE_PREFIX).await?.len())
    }

    /// Move every queued write into `target`, keeping each entry's remaining TTL
    ///
    /// Entries that fail to replay stay queued for the next reconnect.
    pub async fn replay(&self, target: &dyn KeyValueStore) -> Result<usize> {
        let mut replayed = 0;
        for queue_key in self.store.enumerate(OFFLINE_PREFIX).await? {
            let key = &queue_key[OFFLINE_PREFIX.len()..];
            let Some((value, remaining)) = self.get(key).await? else {
                continue;
            };

            match target.set(key, value, remaining).await {
                Ok(()) => {
                    self.store.remove(&queue_key).await?;
                    replayed += 1;
                }
                Err(e) => warn!("Failed to replay queued write {}: {}", key, e),
            }
        }

        if replayed > 0 {
            debug!("Replayed {} queued cache writes", replayed);
        }
        Ok(replayed)
    }
}
