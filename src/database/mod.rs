/*!
 * Database module for the durable cache tier.
 *
 * This module provides SQLite-based persistence for:
 * - Cached detection and translation results that survive restarts
 * - Writes queued while the cache is offline
 */

pub mod connection;
pub mod kv;
pub mod schema;

// Re-export main types
pub use connection::DatabaseConnection;
pub use kv::SqliteStore;
