//! Core types and shared functionality for sheetnews.
//!
//! This crate provides:
//! - TTL cache store with SQLite persistence
//! - Typed error taxonomy
//! - Layered application configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheConfig, CacheDb, CacheKey, CacheStats, CacheStore, CleanupHandle, EntryInfo};
pub use config::{AppConfig, ConfigError};
pub use error::{Error, ErrorKind, RemoteError, StorageError};
