//! Per-document advisory locking.
//!
//! Guarantees at most one ingestion writer per document at a time, without
//! requiring the store itself to serialize unrelated documents' writes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A table of per-document mutexes, created lazily on first use.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl DocumentLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, document_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the advisory lock for `document_id`, blocking other callers
    /// of this method for the same document until the returned guard drops.
    pub async fn acquire(&self, document_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        self.entry(document_id).lock_owned().await
    }
}
