//! Ordered background writer mirroring cache mutations to SQLite.
//!
//! The in-memory store is synchronous, so it never awaits the database.
//! Mutations are queued on an unbounded channel and applied one at a time by
//! a single task, which keeps them in call order.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::connection::CacheDb;
use super::records::StoredRecord;

/// Persisted payload envelope.
///
/// Times are milliseconds since the Unix epoch, `ttl` is in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedEntry<V> {
    pub data: V,
    pub timestamp: i64,
    pub ttl: u64,
    pub expires_at: i64,
}

#[derive(Debug)]
pub(crate) enum PersistOp {
    Put(StoredRecord),
    Remove(String),
    /// Remove every record whose storage key starts with the given prefix.
    Clear(String),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task. The task exits once every handle is dropped.
#[derive(Debug, Clone)]
pub(crate) struct PersistWriter {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistWriter {
    pub(crate) fn spawn(db: CacheDb) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(db, rx));
        Self { tx }
    }

    pub(crate) fn send(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!("cache persistence writer has stopped; dropping write");
        }
    }

    /// Wait until every operation queued before this call has been applied.
    pub(crate) async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run(db: CacheDb, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::Put(record) => {
                if let Err(e) = db.put_record(&record).await {
                    tracing::warn!(key = %record.storage_key, error = %e, "cache persistence failed");
                }
            }
            PersistOp::Remove(key) => {
                if let Err(e) = db.delete_record(&key).await {
                    tracing::warn!(key = %key, error = %e, "cache removal from storage failed");
                }
            }
            PersistOp::Clear(prefix) => match db.clear_records(&prefix).await {
                Ok(count) => tracing::debug!(prefix = %prefix, count, "cache storage cleared"),
                Err(e) => tracing::warn!(prefix = %prefix, error = %e, "cache storage clearing failed"),
            },
            PersistOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("cache persistence writer stopped");
}
