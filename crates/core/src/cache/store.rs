//! In-memory TTL cache with LRU eviction and optional SQLite mirroring.
//!
//! The store is synchronous: every operation takes a short `std::sync::Mutex`
//! critical section. When persistence is enabled, mutations are forwarded to
//! the ordered writer in [`super::persist`] after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::connection::CacheDb;
use super::key::CacheKey;
use super::persist::{PersistOp, PersistWriter, PersistedEntry};
use super::records::StoredRecord;

/// Cache sizing and expiry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
    /// Prefix of persisted storage keys.
    pub storage_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            storage_prefix: "api_cache_".into(),
        }
    }
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Cleanup passes that removed at least one entry.
    pub cleanups: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of reads served from the cache, `0.0` before any read.
    pub fn hit_rate(&self) -> f64 {
        match self.total_requests() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

/// Debug view of a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: CacheKey,
    pub age: Duration,
    pub remaining_ttl: Duration,
    /// Time since the last read, or since the write if never read.
    pub idle: Duration,
    pub access_count: u64,
    pub expired: bool,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: i64,
    ttl: Duration,
    expires_at: i64,
    access_count: u64,
    last_accessed_at: i64,
    /// Logical clock value of the last write or read. Eviction order.
    touched: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, now: i64, ttl: Duration, touched: u64) -> Self {
        let expires_at = now.saturating_add(duration_ms(ttl));
        Self { value, created_at: now, ttl, expires_at, access_count: 0, last_accessed_at: now, touched }
    }

    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    fn lru_rank(&self) -> u64 {
        self.touched
    }
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    stats: CacheStats,
    clock: u64,
}

impl<V> Inner<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove_expired(&mut self, now: i64) -> Vec<CacheKey> {
        let expired: Vec<CacheKey> =
            self.entries.iter().filter(|(_, e)| e.is_expired(now)).map(|(k, _)| k.clone()).collect();
        for key in &expired {
            self.entries.remove(key);
        }
        if !expired.is_empty() {
            self.stats.cleanups += 1;
        }
        expired
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let key = self.entries.iter().min_by_key(|(_, e)| e.lru_rank()).map(|(k, _)| k.clone())?;
        self.entries.remove(&key);
        self.stats.deletes += 1;
        Some(key)
    }
}

/// TTL cache shared across content slots via `Arc<CacheStore<V>>`.
#[derive(Debug)]
pub struct CacheStore<V> {
    config: CacheConfig,
    inner: Mutex<Inner<V>>,
    writer: Option<PersistWriter>,
}

impl<V> CacheStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// Create an in-memory store.
    pub fn new(config: CacheConfig) -> Self {
        let inner = Inner { entries: HashMap::new(), stats: CacheStats::default(), clock: 0 };
        Self { config, inner: Mutex::new(inner), writer: None }
    }

    /// Create a store mirrored to `db`.
    ///
    /// Live records under the storage prefix are loaded with their original
    /// timestamps; expired or undecodable records are purged. A failed load is
    /// logged and leaves the store empty.
    pub async fn with_persistence(config: CacheConfig, db: CacheDb) -> Self {
        let now = now_ms();
        let mut loaded = Vec::new();
        let mut stale = Vec::new();

        match db.load_records(&config.storage_prefix).await {
            Ok(records) => {
                for record in records {
                    let Some(raw) = record.storage_key.strip_prefix(&config.storage_prefix) else {
                        continue;
                    };
                    match serde_json::from_str::<PersistedEntry<V>>(&record.payload) {
                        Ok(entry) if entry.expires_at > now && entry.timestamp <= entry.expires_at => {
                            loaded.push((CacheKey::from_raw(raw), entry))
                        }
                        Ok(_) => stale.push(record.storage_key),
                        Err(e) => {
                            tracing::debug!(key = %record.storage_key, error = %e, "dropping corrupt cache record");
                            stale.push(record.storage_key);
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "cache loading from storage failed"),
        }

        loaded.sort_by_key(|(_, entry)| entry.timestamp);
        let mut inner: Inner<V> = Inner { entries: HashMap::new(), stats: CacheStats::default(), clock: 0 };
        for (key, entry) in loaded {
            let touched = inner.tick();
            inner.entries.insert(
                key,
                CacheEntry {
                    value: entry.data,
                    created_at: entry.timestamp,
                    ttl: Duration::from_millis(entry.ttl),
                    expires_at: entry.expires_at,
                    access_count: 0,
                    last_accessed_at: entry.timestamp,
                    touched,
                },
            );
        }

        if !inner.entries.is_empty() {
            tracing::info!(count = inner.entries.len(), "cache loaded from storage");
        }

        let writer = PersistWriter::spawn(db);
        for key in stale {
            writer.send(PersistOp::Remove(key));
        }

        Self { config, inner: Mutex::new(inner), writer: Some(writer) }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_persistent(&self) -> bool {
        self.writer.is_some()
    }

    /// Insert or overwrite `key`, expiring after `ttl`.
    ///
    /// Inserting a new key into a full store first drops expired entries, then
    /// evicts the least recently accessed ones until a slot is free.
    pub fn set(&self, key: CacheKey, value: V, ttl: Duration) {
        let now = now_ms();
        let (removed, entry) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let mut removed = Vec::new();

            if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_entries {
                removed.extend(inner.remove_expired(now));
                while inner.entries.len() >= self.config.max_entries {
                    match inner.evict_lru() {
                        Some(evicted) => {
                            tracing::debug!(key = %evicted, "cache evicted least recently used entry");
                            removed.push(evicted);
                        }
                        None => break,
                    }
                }
            }

            let touched = inner.tick();
            let entry = CacheEntry::new(value, now, ttl, touched);
            let persisted = self.writer.is_some().then(|| entry.clone());
            inner.entries.insert(key.clone(), entry);
            inner.stats.sets += 1;
            (removed, persisted)
        };

        tracing::debug!(key = %key, ttl_ms = duration_ms(ttl), "cache set");
        for evicted in removed {
            self.persist_remove(&evicted);
        }
        if let Some(entry) = entry {
            self.persist_put(&key, entry);
        }
    }

    /// Insert with the configured default TTL.
    pub fn set_default(&self, key: CacheKey, value: V) {
        self.set(key, value, self.config.default_ttl);
    }

    /// Read a live value, counting a hit or a miss.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = now_ms();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.stats.misses += 1;
                tracing::debug!(key = %key, "cache miss");
                return None;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.stats.deletes += 1;
            inner.stats.misses += 1;
            drop(guard);
            tracing::debug!(key = %key, "cache entry expired");
            self.persist_remove(key);
            return None;
        }

        let touched = inner.tick();
        let entry = inner.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed_at = now;
        entry.touched = touched;
        inner.stats.hits += 1;
        tracing::debug!(
            key = %key,
            age_ms = now.saturating_sub(entry.created_at),
            remaining_ms = entry.expires_at.saturating_sub(now),
            "cache hit"
        );
        Some(entry.value.clone())
    }

    /// Whether `key` holds a live value. Does not touch statistics.
    pub fn has(&self, key: &CacheKey) -> bool {
        let now = now_ms();
        self.lock().entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Remove `key`. Returns whether an entry was removed.
    pub fn delete(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut inner = self.lock();
            let removed = inner.entries.remove(key).is_some();
            if removed {
                inner.stats.deletes += 1;
            }
            removed
        };
        if removed {
            tracing::debug!(key = %key, "cache delete");
            self.persist_remove(key);
        }
        removed
    }

    /// Remove every entry and every persisted record under the storage prefix.
    pub fn clear(&self) -> usize {
        let count = {
            let mut inner = self.lock();
            let count = inner.entries.len();
            inner.entries.clear();
            count
        };
        tracing::info!(count, "cache cleared");
        if let Some(writer) = &self.writer {
            writer.send(PersistOp::Clear(self.config.storage_prefix.clone()));
        }
        count
    }

    /// Remove every entry whose key belongs to `namespace`.
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let removed: Vec<CacheKey> = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let keys: Vec<CacheKey> = inner.entries.keys().filter(|k| k.in_namespace(namespace)).cloned().collect();
            for key in &keys {
                inner.entries.remove(key);
            }
            inner.stats.deletes += keys.len() as u64;
            keys
        };
        tracing::debug!(namespace, count = removed.len(), "cache namespace cleared");
        for key in &removed {
            self.persist_remove(key);
        }
        removed.len()
    }

    /// Remove expired entries. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let removed = self.lock().remove_expired(now_ms());
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "cache cleanup removed expired entries");
        }
        for key in &removed {
            self.persist_remove(key);
        }
        removed.len()
    }

    /// Snapshot of every entry, sorted by key.
    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = now_ms();
        let inner = self.lock();
        let mut infos: Vec<EntryInfo> = inner
            .entries
            .iter()
            .map(|(key, e)| EntryInfo {
                key: key.clone(),
                age: millis(now.saturating_sub(e.created_at)),
                remaining_ttl: millis(e.expires_at.saturating_sub(now)),
                idle: millis(now.saturating_sub(e.last_accessed_at)),
                access_count: e.access_count,
                expired: e.is_expired(now),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats { size: inner.entries.len(), ..inner.stats }
    }

    /// Wait for queued persistence writes to land. No-op without persistence.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    /// Start the periodic expiry sweep.
    ///
    /// The task only holds a weak reference and stops on its own once the
    /// store is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> CleanupHandle {
        let store = Arc::downgrade(self);
        let period = self.config.cleanup_interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        store.cleanup();
                    }
                }
            }
            tracing::debug!("cache cleanup task stopped");
        });

        tracing::info!(interval_ms = duration_ms(period), "cache cleanup task started");
        CleanupHandle { cancel, task: Some(task) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.config.storage_prefix, key)
    }

    fn persist_put(&self, key: &CacheKey, entry: CacheEntry<V>) {
        let Some(writer) = &self.writer else { return };
        let expires_at = entry.expires_at;
        let ttl = u64::try_from(entry.ttl.as_millis()).unwrap_or(u64::MAX);
        let envelope = PersistedEntry { data: entry.value, timestamp: entry.created_at, ttl, expires_at };
        match serde_json::to_string(&envelope) {
            Ok(payload) => {
                let record = StoredRecord { storage_key: self.storage_key(key), payload, expires_at };
                writer.send(PersistOp::Put(record));
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "cache persistence failed"),
        }
    }

    fn persist_remove(&self, key: &CacheKey) {
        if let Some(writer) = &self.writer {
            writer.send(PersistOp::Remove(self.storage_key(key)));
        }
    }
}

/// Stops the cleanup task on [`CleanupHandle::shutdown`] or drop.
#[derive(Debug)]
pub struct CleanupHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn key(name: &str) -> CacheKey {
        CacheKey::builder("test").param(name).build()
    }

    fn store(max_entries: usize) -> CacheStore<String> {
        CacheStore::new(CacheConfig { max_entries, ..CacheConfig::default() })
    }

    #[test]
    fn test_set_get_round_trip() {
        let cache = store(10);
        cache.set(key("a"), "hello".into(), Duration::from_secs(60));

        assert_eq!(cache.get(&key("a")).as_deref(), Some("hello"));
        assert_eq!(cache.get(&key("missing")), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.total_requests(), 2);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_without_requests() {
        assert_eq!(store(1).stats().hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_ttl_window() {
        let cache = store(10);
        cache.set(key("a"), "v".into(), Duration::from_millis(100));
        assert!(cache.has(&key("a")));
        assert_eq!(cache.get(&key("a")).as_deref(), Some("v"));

        sleep(Duration::from_millis(150)).await;

        assert!(!cache.has(&key("a")));
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let cache = store(10);
        cache.set(key("a"), "v".into(), Duration::ZERO);
        assert_eq!(cache.get(&key("a")), None);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = store(3);
        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        cache.set(key("b"), "b".into(), Duration::from_secs(60));
        cache.set(key("c"), "c".into(), Duration::from_secs(60));
        assert!(cache.get(&key("a")).is_some());

        cache.set(key("d"), "d".into(), Duration::from_secs(60));

        assert_eq!(cache.len(), 3);
        assert!(cache.has(&key("a")));
        assert!(!cache.has(&key("b")));
        assert!(cache.has(&key("c")));
        assert!(cache.has(&key("d")));
        assert_eq!(cache.stats().deletes, 1);
    }

    #[test]
    fn test_eviction_follows_access_order_within_a_millisecond() {
        let cache = store(2);
        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        cache.set(key("b"), "b".into(), Duration::from_secs(60));
        assert!(cache.get(&key("a")).is_some());

        // a was written earlier, both last touched in the same millisecond
        {
            let mut inner = cache.lock();
            let b = inner.entries[&key("b")].clone();
            let a = inner.entries.get_mut(&key("a")).unwrap();
            a.created_at = b.created_at - 1_000;
            a.last_accessed_at = b.last_accessed_at;
        }

        cache.set(key("c"), "c".into(), Duration::from_secs(60));

        assert!(cache.has(&key("a")));
        assert!(!cache.has(&key("b")));
        assert!(cache.has(&key("c")));
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let cache = store(2);
        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        cache.set(key("b"), "b".into(), Duration::from_secs(60));
        cache.set(key("a"), "a2".into(), Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("a")).as_deref(), Some("a2"));
        assert!(cache.has(&key("b")));
        assert_eq!(cache.stats().deletes, 0);
    }

    #[tokio::test]
    async fn test_capacity_prefers_expired_entries() {
        let cache = store(2);
        cache.set(key("short"), "s".into(), Duration::from_millis(20));
        cache.set(key("long"), "l".into(), Duration::from_secs(60));
        sleep(Duration::from_millis(50)).await;

        cache.set(key("new"), "n".into(), Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert!(cache.has(&key("long")));
        assert!(cache.has(&key("new")));
        let stats = cache.stats();
        assert_eq!(stats.cleanups, 1);
        assert_eq!(stats.deletes, 0);
    }

    #[test]
    fn test_delete_and_clear_idempotent() {
        let cache = store(10);
        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        cache.set(key("b"), "b".into(), Duration::from_secs(60));

        assert!(cache.delete(&key("a")));
        assert!(!cache.delete(&key("a")));
        assert_eq!(cache.stats().deletes, 1);

        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.clear(), 0);
        assert!(cache.is_empty());
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_has_does_not_touch_stats() {
        let cache = store(10);
        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        assert!(cache.has(&key("a")));
        assert!(!cache.has(&key("b")));

        let stats = cache.stats();
        assert_eq!(stats.total_requests(), 0);
        assert_eq!(cache.entries()[0].access_count, 0);
    }

    #[test]
    fn test_clear_namespace() {
        let cache = store(10);
        let one = CacheKey::builder("google-sheets-one").param("Sheet1!A:Z").build();
        let two = CacheKey::builder("google-sheets-two").param("Sheet1!A:Z").build();
        cache.set(one.clone(), "1".into(), Duration::from_secs(60));
        cache.set(two.clone(), "2".into(), Duration::from_secs(60));

        assert_eq!(cache.clear_namespace("google-sheets-one"), 1);
        assert!(!cache.has(&one));
        assert!(cache.has(&two));
    }

    #[tokio::test]
    async fn test_cleanup_counts_passes() {
        let cache = store(10);
        cache.set(key("a"), "a".into(), Duration::from_millis(20));
        cache.set(key("b"), "b".into(), Duration::from_secs(60));
        sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.cleanup(), 0);
        assert_eq!(cache.stats().cleanups, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_entries_debug_listing() {
        let cache = store(10);
        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        cache.get(&key("a"));
        cache.get(&key("a"));

        let entries = cache.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key("a"));
        assert_eq!(entries[0].access_count, 2);
        assert!(!entries[0].expired);
        assert!(entries[0].remaining_ttl <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_spawn_cleanup_sweeps_expired() {
        let cache = Arc::new(CacheStore::<String>::new(CacheConfig {
            cleanup_interval: Duration::from_millis(20),
            ..CacheConfig::default()
        }));
        cache.set(key("a"), "a".into(), Duration::from_millis(10));
        let handle = cache.spawn_cleanup();

        sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.len(), 0);
        assert!(cache.stats().cleanups >= 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_persistence_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        {
            let db = CacheDb::open(&path).await.unwrap();
            let cache = CacheStore::<String>::with_persistence(CacheConfig::default(), db).await;
            assert!(cache.is_persistent());
            cache.set(key("a"), "persisted".into(), Duration::from_secs(60));
            cache.set(key("gone"), "x".into(), Duration::from_secs(60));
            cache.delete(&key("gone"));
            cache.flush().await;
        }

        let db = CacheDb::open(&path).await.unwrap();
        let cache = CacheStore::<String>::with_persistence(CacheConfig::default(), db).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("a")).as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn test_load_purges_expired_and_corrupt_records() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let expired = PersistedEntry { data: "old".to_string(), timestamp: 1_000, ttl: 10, expires_at: 1_010 };
        db.put_record(&StoredRecord {
            storage_key: format!("api_cache_{}", key("old")),
            payload: serde_json::to_string(&expired).unwrap(),
            expires_at: 1_010,
        })
        .await
        .unwrap();
        db.put_record(&StoredRecord {
            storage_key: format!("api_cache_{}", key("bad")),
            payload: "not json".into(),
            expires_at: i64::MAX,
        })
        .await
        .unwrap();

        let cache = CacheStore::<String>::with_persistence(CacheConfig::default(), db.clone()).await;
        cache.flush().await;

        assert!(cache.is_empty());
        assert_eq!(db.count_records("api_cache_").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_removes_persisted_records() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = CacheStore::<String>::with_persistence(CacheConfig::default(), db.clone()).await;
        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        cache.set(key("b"), "b".into(), Duration::from_secs(60));
        cache.flush().await;
        assert_eq!(db.count_records("api_cache_").await.unwrap(), 2);

        cache.clear();
        cache.flush().await;
        assert_eq!(db.count_records("api_cache_").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_memory_writes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = CacheStore::<String>::with_persistence(CacheConfig::default(), db.clone()).await;
        db.conn.call(|conn| conn.execute_batch("DROP TABLE cache_records")).await.unwrap();

        cache.set(key("a"), "a".into(), Duration::from_secs(60));
        cache.set(key("b"), "b".into(), Duration::from_secs(60));
        assert!(cache.delete(&key("b")));
        cache.clear_namespace("other");
        cache.flush().await;

        assert_eq!(cache.get(&key("a")).as_deref(), Some("a"));
        assert!(!cache.has(&key("b")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().sets, 2);
    }

    #[tokio::test]
    async fn test_load_tolerates_extreme_timestamps() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let expires_at = now_ms() + 60_000;
        let ancient = PersistedEntry { data: "ancient".to_string(), timestamp: i64::MIN, ttl: 10, expires_at };
        let inverted = PersistedEntry { data: "inverted".to_string(), timestamp: i64::MAX, ttl: 10, expires_at };
        for (name, entry) in [("ancient", &ancient), ("inverted", &inverted)] {
            db.put_record(&StoredRecord {
                storage_key: format!("api_cache_{}", key(name)),
                payload: serde_json::to_string(entry).unwrap(),
                expires_at,
            })
            .await
            .unwrap();
        }

        let cache = CacheStore::<String>::with_persistence(CacheConfig::default(), db.clone()).await;
        cache.flush().await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("ancient")).as_deref(), Some("ancient"));
        let info = &cache.entries()[0];
        assert!(info.age > Duration::from_secs(60 * 60 * 24 * 365));
        assert!(info.idle < Duration::from_secs(60));
        assert!(!info.expired);
        assert_eq!(db.count_records("api_cache_").await.unwrap(), 1);
    }
}
