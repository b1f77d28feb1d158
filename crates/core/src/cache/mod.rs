//! TTL content cache with optional SQLite persistence.
//!
//! This module provides the in-memory [`CacheStore`] shared by content slots,
//! and the durable medium it mirrors to:
//!
//! - Namespaced, digest-based cache keys using SHA-256
//! - TTL expiry with LRU eviction at capacity
//! - Hit/miss statistics and a periodic cleanup task
//! - SQLite mirroring via tokio-rusqlite with automatic schema migrations

pub mod connection;
pub mod key;
pub mod migrations;
mod persist;
pub mod records;
pub mod store;

pub use connection::CacheDb;
pub use key::{CacheKey, CacheKeyBuilder};
pub use records::StoredRecord;
pub use store::{CacheConfig, CacheStats, CacheStore, CleanupHandle, EntryInfo};
