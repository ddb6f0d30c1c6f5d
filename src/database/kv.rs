/*!
 * SQLite implementation of the durable cache store.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use super::DatabaseConnection;
use crate::cache::{KeyValueStore, StoredValue};

/// Key/value store backed by the `cache_entries` table
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: DatabaseConnection,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Escape LIKE wildcards so prefixes match literally
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl SqliteStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open (or create) a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new(path)?))
    }

    /// Open the store at the default location
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_default()?))
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Delete entries past their expiry
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = now_millis();
        let removed = self
            .db
            .execute_async(move |conn| {
                Ok(conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", [now])?)
            })
            .await?;
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        Ok(removed)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        let key = key.to_string();
        let now = now_millis();
        self.db
            .execute_async(move |conn| {
                let row: Option<(Vec<u8>, i64)> = conn
                    .query_row(
                        "SELECT value, expires_at FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                        params![key, now],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .context("Failed to read cache entry")?;

                Ok(row.map(|(value, expires_at)| StoredValue {
                    value,
                    remaining: Duration::from_millis(u64::try_from(expires_at - now).unwrap_or(0)),
                }))
            })
            .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let key = key.to_string();
        let now = now_millis();
        let expires_at = now.saturating_add(ttl_millis(ttl));
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO cache_entries (key, value, expires_at, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![key, value, expires_at, now],
                )
                .context("Failed to write cache entry")?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.db
            .execute_async(move |conn| {
                conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])?;
                Ok(())
            })
            .await
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = like_prefix(prefix);
        let now = now_millis();
        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key FROM cache_entries
                     WHERE key LIKE ?1 ESCAPE '\\' AND expires_at > ?2
                     ORDER BY key",
                )?;
                let keys = stmt
                    .query_map(params![pattern, now], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
    }

    async fn clear(&self) -> Result<usize> {
        self.db
            .execute_async(|conn| Ok(conn.execute("DELETE FROM cache_entries", [])?))
            .await
    }
}
