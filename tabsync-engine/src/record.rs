//! Sync operation records.
//!
//! A `SyncOperationRecord` summarizes one sync pass for the external
//! history component. The engine populates it; storage and retention are
//! not its concern. Failed passes report partial progress truthfully,
//! never hide it.

use crate::conflict::Conflict;
use crate::error::SyncError;
use crate::merge::MergeOperation;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabsync_types::{DeviceId, SyncId, Timestamp};

/// Which way data moved during a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Upload,
    Download,
    Bidirectional,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Bidirectional => "bidirectional",
        };
        write!(f, "{name}")
    }
}

/// Terminal status of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    Failed,
}

/// One error encountered during a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    /// Machine-readable error kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// When the error occurred.
    pub timestamp: Timestamp,
}

impl SyncErrorEntry {
    /// Creates an entry from a sync error.
    #[must_use]
    pub fn from_error(error: &SyncError, timestamp: Timestamp) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp,
        }
    }

    /// Creates an entry that has no `SyncError` counterpart, such as a
    /// cooperative cancellation or a per-tab apply failure.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            timestamp,
        }
    }
}

/// Summary of one sync pass, the durable contract consumed by the
/// external history component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperationRecord {
    /// Unique, time-ordered pass identifier.
    pub sync_id: SyncId,
    /// Device that ran the pass.
    pub device_id: DeviceId,
    /// When the pass started.
    pub started_at: Timestamp,
    /// When the pass reached a terminal state.
    pub finished_at: Timestamp,
    /// Requested or degraded-to direction.
    pub direction: SyncDirection,
    /// Terminal status.
    pub status: SyncStatus,
    /// Audit trail of everything the pass did.
    pub operations: Vec<MergeOperation>,
    /// Conflicts the pass detected.
    pub conflicts: Vec<Conflict>,
    /// Errors encountered, in order of occurrence.
    pub errors: Vec<SyncErrorEntry>,
}

impl SyncOperationRecord {
    /// Starts a record for a new pass.
    #[must_use]
    pub fn begin(device_id: DeviceId, direction: SyncDirection, started_at: Timestamp) -> Self {
        Self {
            sync_id: SyncId::new(),
            device_id,
            started_at,
            finished_at: started_at,
            direction,
            status: SyncStatus::Completed,
            operations: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Records an error and marks the pass failed.
    pub fn record_failure(&mut self, error: &SyncError, timestamp: Timestamp) {
        self.errors.push(SyncErrorEntry::from_error(error, timestamp));
        self.status = SyncStatus::Failed;
    }

    /// Closes the record at the given instant.
    pub fn finish(&mut self, finished_at: Timestamp) {
        self.finished_at = finished_at;
    }

    /// The first error's message, the one surfaced to the user.
    #[must_use]
    pub fn first_error_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_first_error_message() {
        let mut record = SyncOperationRecord::begin(
            DeviceId::new(),
            SyncDirection::Bidirectional,
            Timestamp::from_millis(100),
        );
        record.record_failure(
            &SyncError::RemoteStore("store unreachable".into()),
            Timestamp::from_millis(150),
        );
        record.record_failure(&SyncError::SnapshotNotFound, Timestamp::from_millis(160));
        record.finish(Timestamp::from_millis(200));

        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(
            record.first_error_message(),
            Some("remote store error: store unreachable")
        );
        assert_eq!(record.errors.len(), 2);
    }

    #[test]
    fn error_entry_serializes_kind_as_type() {
        let entry = SyncErrorEntry::from_error(
            &SyncError::SyncInFlight,
            Timestamp::from_millis(1),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "sync_in_flight");
    }
}
