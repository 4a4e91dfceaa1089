//! Conflict detection, resolution, and merge engine for TabSync.
//!
//! The engine reconciles two independently evolved tab sets — this
//! device's and the remote snapshot's — into one consistent result:
//! - [`ConflictDetector`]: five independent detection passes
//! - [`ConflictPrioritizer`]: stable severity/kind ordering
//! - [`StrategyResolver`]: per-subtype strategy selection with defaults
//! - [`MergeEngine`]: fixed-order merge with a full audit trail
//! - [`SyncCoordinator`]: the state machine driving one sync pass
//!
//! The first four are pure and safe to call concurrently; the
//! coordinator owns the single-flight guard and the last-sync watermark.
//! Browsers, remote storage, human conflict resolution, and device
//! identity sit behind the traits in [`browser`], [`remote`],
//! [`presenter`], and [`identity`].

pub mod browser;
pub mod conflict;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod identity;
pub mod merge;
pub mod presenter;
pub mod prioritizer;
pub mod record;
pub mod remote;
pub mod resolution;

pub use browser::{ApplyOutcome, MockTabSource, TabSource};
pub use conflict::{Conflict, ConflictDetail, ConflictKind, Severity, TabField, TabMove};
pub use coordinator::{CancelFlag, CoordinatorConfig, SyncCoordinator, SyncPhase};
pub use detector::{ConflictDetector, DetectorConfig};
pub use error::{SyncError, SyncResult};
pub use identity::{DeviceIdentity, EphemeralIdentity};
pub use merge::{MergeEngine, MergeOpKind, MergeOperation, MergeResult};
pub use presenter::{ConflictPresenter, ResolutionChoices, ScriptedPresenter};
pub use prioritizer::ConflictPrioritizer;
pub use record::{SyncDirection, SyncErrorEntry, SyncOperationRecord, SyncStatus};
pub use remote::{
    MemoryRemoteStore, RemoteMetadata, RemoteStore, RetrievedSnapshot, StoreReceipt,
};
pub use resolution::{Resolution, ResolutionPlan, ResolutionStrategy, StrategyResolver};

use tabsync_types::{DeviceId, DeviceMetadata, SyncSnapshot, TabSet, Timestamp};

/// Detects conflicts between a local tab set and a remote snapshot with
/// default detector tuning.
#[must_use]
pub fn detect_conflicts(
    device: DeviceMetadata,
    local: &TabSet,
    remote: &SyncSnapshot,
    last_sync: Timestamp,
) -> Vec<Conflict> {
    ConflictDetector::new(device).detect(local, remote, last_sync)
}

/// Resolves the conflicts (honoring `choices` where legal) and merges the
/// two tab sets in one step.
#[must_use]
pub fn resolve_and_merge(
    local_device: DeviceId,
    local: &TabSet,
    remote: &TabSet,
    conflicts: &[Conflict],
    choices: &ResolutionChoices,
) -> MergeResult {
    resolve_and_merge_at(local_device, local, remote, conflicts, choices, Timestamp::now())
}

/// [`resolve_and_merge`] against an explicit clock. With fixed inputs,
/// choices, and clock, the output is fully deterministic.
#[must_use]
pub fn resolve_and_merge_at(
    local_device: DeviceId,
    local: &TabSet,
    remote: &TabSet,
    conflicts: &[Conflict],
    choices: &ResolutionChoices,
    now: Timestamp,
) -> MergeResult {
    let plan = StrategyResolver::new().resolve_all(conflicts, choices);
    MergeEngine::new(local_device).merge_at(local, remote, conflicts, &plan, now)
}
