//! Persisted cache record CRUD operations.
//!
//! Records are opaque JSON payloads addressed by a storage key of the form
//! `{prefix}{cache_key}`. The store layer decides what goes in the payload.

use super::connection::CacheDb;
use crate::error::StorageError;
use tokio_rusqlite::params;

/// A raw persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub storage_key: String,
    pub payload: String,
    /// Expiry in milliseconds since the Unix epoch.
    pub expires_at: i64,
}

impl CacheDb {
    /// Insert or replace a record.
    pub async fn put_record(&self, record: &StoredRecord) -> Result<(), StorageError> {
        let record = record.clone();
        self.conn
            .call(move |conn| -> Result<(), StorageError> {
                conn.execute(
                    "INSERT INTO cache_records (storage_key, payload, expires_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(storage_key) DO UPDATE SET
                        payload = excluded.payload,
                        expires_at = excluded.expires_at,
                        updated_at = excluded.updated_at",
                    params![record.storage_key, record.payload, record.expires_at, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(StorageError::from)
    }

    /// Load every record whose storage key starts with `prefix`.
    pub async fn load_records(&self, prefix: &str) -> Result<Vec<StoredRecord>, StorageError> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<StoredRecord>, StorageError> {
                let mut stmt = conn.prepare(
                    "SELECT storage_key, payload, expires_at FROM cache_records
                     WHERE substr(storage_key, 1, length(?1)) = ?1
                     ORDER BY storage_key",
                )?;

                let rows = stmt.query_map(params![prefix], |row| {
                    Ok(StoredRecord { storage_key: row.get(0)?, payload: row.get(1)?, expires_at: row.get(2)? })
                })?;

                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await
            .map_err(StorageError::from)
    }

    /// Delete a single record. Returns whether a row was removed.
    pub async fn delete_record(&self, storage_key: &str) -> Result<bool, StorageError> {
        let storage_key = storage_key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, StorageError> {
                let count = conn.execute("DELETE FROM cache_records WHERE storage_key = ?1", params![storage_key])?;
                Ok(count > 0)
            })
            .await
            .map_err(StorageError::from)
    }

    /// Delete every record under `prefix`.
    ///
    /// Returns the number of deleted records.
    pub async fn clear_records(&self, prefix: &str) -> Result<u64, StorageError> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<u64, StorageError> {
                let count = conn.execute(
                    "DELETE FROM cache_records WHERE substr(storage_key, 1, length(?1)) = ?1",
                    params![prefix],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(StorageError::from)
    }

    /// Count records under `prefix`.
    pub async fn count_records(&self, prefix: &str) -> Result<u64, StorageError> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<u64, StorageError> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_records WHERE substr(storage_key, 1, length(?1)) = ?1",
                    params![prefix],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(StorageError::from)
    }
}
