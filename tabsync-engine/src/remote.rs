//! The remote-store boundary.
//!
//! Remote storage holds a single named snapshot per sync group. The
//! store is a dumb byte bucket with checksums; retry and backoff belong
//! to implementations, never to the engine.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use tabsync_types::{SyncSnapshot, Timestamp};

/// Hex-encoded SHA-256 of the serialized snapshot.
#[must_use]
pub fn snapshot_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Storage-side metadata about a stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    /// Serialized size in bytes.
    pub size: usize,
    /// When the snapshot was last written.
    pub modified_at: Timestamp,
    /// Checksum of the stored bytes.
    pub checksum: String,
}

/// A snapshot retrieved from remote storage, with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedSnapshot {
    pub snapshot: SyncSnapshot,
    pub metadata: RemoteMetadata,
}

/// Receipt for a successful store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReceipt {
    /// Checksum of the stored bytes.
    pub checksum: String,
    /// Stored size in bytes.
    pub size: usize,
    /// When the write landed.
    pub timestamp: Timestamp,
}

/// Named snapshot storage.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the named snapshot. Fails with
    /// [`SyncError::SnapshotNotFound`] when nothing has been stored yet.
    async fn retrieve(&self, name: &str) -> SyncResult<RetrievedSnapshot>;

    /// Writes the named snapshot, replacing any previous version.
    async fn store(&self, name: &str, snapshot: &SyncSnapshot) -> SyncResult<StoreReceipt>;
}

/// In-memory store for tests. Keeps serialized bytes so checksums and
/// sizes behave like a real backend, and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    entries: Mutex<HashMap<String, (SyncSnapshot, RemoteMetadata)>>,
    fail_retrieves: Mutex<Option<String>>,
    fail_stores: Mutex<Option<String>>,
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all subsequent retrieves fail with the given message.
    pub fn fail_retrieves(&self, message: impl Into<String>) {
        *self.fail_retrieves.lock().unwrap() = Some(message.into());
    }

    /// Makes all subsequent stores fail with the given message.
    pub fn fail_stores(&self, message: impl Into<String>) {
        *self.fail_stores.lock().unwrap() = Some(message.into());
    }

    /// The stored snapshot under `name`, if any.
    #[must_use]
    pub fn stored(&self, name: &str) -> Option<SyncSnapshot> {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|(snapshot, _)| snapshot.clone())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn retrieve(&self, name: &str) -> SyncResult<RetrievedSnapshot> {
        if let Some(message) = self.fail_retrieves.lock().unwrap().clone() {
            return Err(SyncError::RemoteStore(message));
        }
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|(snapshot, metadata)| RetrievedSnapshot {
                snapshot: snapshot.clone(),
                metadata: metadata.clone(),
            })
            .ok_or(SyncError::SnapshotNotFound)
    }

    async fn store(&self, name: &str, snapshot: &SyncSnapshot) -> SyncResult<StoreReceipt> {
        if let Some(message) = self.fail_stores.lock().unwrap().clone() {
            return Err(SyncError::RemoteStore(message));
        }
        let bytes = snapshot.to_json()?;
        let receipt = StoreReceipt {
            checksum: snapshot_checksum(&bytes),
            size: bytes.len(),
            timestamp: Timestamp::now(),
        };
        let metadata = RemoteMetadata {
            size: receipt.size,
            modified_at: receipt.timestamp,
            checksum: receipt.checksum.clone(),
        };
        self.entries
            .lock()
            .unwrap()
            .insert(name.to_string(), (snapshot.clone(), metadata));
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabsync_types::{DeviceId, DeviceMetadata, TabSet};

    fn snapshot() -> SyncSnapshot {
        let device = DeviceMetadata::new(DeviceId::new(), "laptop", "macOS 15.2");
        SyncSnapshot::new(device, TabSet::new(), Timestamp::from_millis(100))
    }

    #[tokio::test]
    async fn retrieve_before_store_is_not_found() {
        let store = MemoryRemoteStore::new();
        let err = store.retrieve("tabs").await.unwrap_err();
        assert!(matches!(err, SyncError::SnapshotNotFound));
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips_with_matching_checksum() {
        let store = MemoryRemoteStore::new();
        let snapshot = snapshot();

        let receipt = store.store("tabs", &snapshot).await.unwrap();
        let retrieved = store.retrieve("tabs").await.unwrap();

        assert_eq!(retrieved.snapshot, snapshot);
        assert_eq!(retrieved.metadata.checksum, receipt.checksum);
        assert_eq!(retrieved.metadata.size, receipt.size);
    }

    #[tokio::test]
    async fn injected_store_failure_propagates() {
        let store = MemoryRemoteStore::new();
        store.fail_stores("quota exceeded");
        let err = store.store("tabs", &snapshot()).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteStore(_)));
    }
}
