//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Unresolved conflicts are not errors — they surface as entries in
/// `MergeResult::unresolved_conflicts`. The pure components (detector,
/// prioritizer, resolver, merge engine) never fail on well-formed input;
/// malformed snapshots are rejected at the coordinator boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote snapshot failed structural validation. Recovered by
    /// degrading the pass to upload; never fatal on its own.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// No remote snapshot exists yet. Expected on first sync.
    #[error("no remote snapshot found")]
    SnapshotNotFound,

    /// The tab-source collaborator failed.
    #[error("tab source error: {0}")]
    TabSource(String),

    /// The remote-store collaborator failed.
    #[error("remote store error: {0}")]
    RemoteStore(String),

    /// A sync pass is already in flight for this device. Fatal to the
    /// triggering call only; the in-flight pass is unaffected.
    #[error("sync already in progress for this device")]
    SyncInFlight,

    /// The conflict presenter did not answer within the bounded wait.
    #[error("conflict presenter timed out")]
    PresenterTimeout,

    /// Device identity operation failed.
    #[error("device identity error: {0}")]
    Identity(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Stable machine-readable name, used in operation records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSnapshot(_) => "invalid_snapshot",
            Self::SnapshotNotFound => "snapshot_not_found",
            Self::TabSource(_) => "tab_source",
            Self::RemoteStore(_) => "remote_store",
            Self::SyncInFlight => "sync_in_flight",
            Self::PresenterTimeout => "presenter_timeout",
            Self::Identity(_) => "identity",
            Self::Serialization(_) => "serialization",
        }
    }
}
