//! The sync coordinator.
//!
//! Drives one sync pass: snapshot the local tabs, fetch the remote
//! snapshot, detect and resolve conflicts, merge, apply, upload. The
//! coordinator owns the only mutable state in the engine — a per-device
//! single-flight guard and the last-sync watermark. The pure components
//! (detector, prioritizer, resolver, merge engine) are instantiated per
//! pass.
//!
//! Failure policy: collaborator I/O errors terminate the pass with a
//! failed record rather than an `Err` — the record is the user-visible
//! contract. Only the single-flight guard rejects a call outright.

use crate::browser::TabSource;
use crate::conflict::Conflict;
use crate::detector::{ConflictDetector, DetectorConfig};
use crate::error::{SyncError, SyncResult};
use crate::identity::DeviceIdentity;
use crate::merge::{MergeEngine, MergeOpKind, MergeOperation};
use crate::presenter::{ConflictPresenter, ResolutionChoices};
use crate::prioritizer::ConflictPrioritizer;
use crate::record::{SyncDirection, SyncErrorEntry, SyncOperationRecord, SyncStatus};
use crate::remote::{RemoteStore, RetrievedSnapshot};
use crate::resolution::{ResolutionStrategy, StrategyResolver};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabsync_types::{DeviceMetadata, SyncSnapshot, TabSet, Timestamp};
use tracing::{debug, info, warn};

/// Phase of a sync pass, for logging and cancellation bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    DetectingConflicts,
    SimpleMerge,
    AdvancedMerge,
    Applying,
    Completed,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::DetectingConflicts => "detecting_conflicts",
            Self::SimpleMerge => "simple_merge",
            Self::AdvancedMerge => "advanced_merge",
            Self::Applying => "applying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Cooperative cancellation signal. Checked between phases; a phase
/// already committed is not rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the pass holding this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Name of the snapshot in remote storage.
    pub snapshot_name: String,
    /// Human-readable name of this device.
    pub device_name: String,
    /// Free-form platform string this device reports.
    pub platform: String,
    /// Bounded wait for the conflict presenter.
    pub presenter_timeout: Duration,
    /// Detector tuning.
    pub detector: DetectorConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            snapshot_name: "tabs".to_string(),
            device_name: "unnamed device".to_string(),
            platform: std::env::consts::OS.to_string(),
            presenter_timeout: Duration::from_secs(10),
            detector: DetectorConfig::default(),
        }
    }
}

/// Orchestrates sync passes over the external collaborators.
pub struct SyncCoordinator {
    config: CoordinatorConfig,
    tabs: Arc<dyn TabSource>,
    store: Arc<dyn RemoteStore>,
    identity: Arc<dyn DeviceIdentity>,
    presenter: Option<Arc<dyn ConflictPresenter>>,
    in_flight: tokio::sync::Mutex<()>,
    last_sync: Mutex<Timestamp>,
}

impl SyncCoordinator {
    /// Creates a coordinator without a conflict presenter; conflicts
    /// resolve to their subtype defaults.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        tabs: Arc<dyn TabSource>,
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn DeviceIdentity>,
    ) -> Self {
        Self {
            config,
            tabs,
            store,
            identity,
            presenter: None,
            in_flight: tokio::sync::Mutex::new(()),
            last_sync: Mutex::new(Timestamp::ZERO),
        }
    }

    /// Attaches a conflict presenter.
    #[must_use]
    pub fn with_presenter(mut self, presenter: Arc<dyn ConflictPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// The last completed pass's watermark, `Timestamp::ZERO` if none.
    #[must_use]
    pub fn last_sync(&self) -> Timestamp {
        *self.last_sync.lock().unwrap()
    }

    /// Runs one sync pass.
    ///
    /// Collaborator failures yield `Ok` with a failed record. The only
    /// `Err` is [`SyncError::SyncInFlight`], raised immediately when a
    /// pass is already running on this device.
    pub async fn run_sync_pass(
        &self,
        direction: SyncDirection,
    ) -> SyncResult<SyncOperationRecord> {
        self.run_sync_pass_with_cancel(direction, CancelFlag::new())
            .await
    }

    /// Runs one sync pass with a cooperative cancellation flag.
    pub async fn run_sync_pass_with_cancel(
        &self,
        direction: SyncDirection,
        cancel: CancelFlag,
    ) -> SyncResult<SyncOperationRecord> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("rejecting sync pass, one is already in flight");
            return Err(SyncError::SyncInFlight);
        };

        let started = Timestamp::now();
        let mut record = SyncOperationRecord::begin(self.identity.current_id(), direction, started);
        info!(sync_id = %record.sync_id, %direction, "sync pass started");

        if let Err(error) = self.drive(direction, &cancel, &mut record).await {
            warn!(sync_id = %record.sync_id, %error, "sync pass failed");
            record.record_failure(&error, Timestamp::now());
        }
        record.finish(Timestamp::now());

        match record.status {
            SyncStatus::Completed => {
                *self.last_sync.lock().unwrap() = record.finished_at;
                info!(
                    sync_id = %record.sync_id,
                    phase = %SyncPhase::Completed,
                    operations = record.operations.len(),
                    conflicts = record.conflicts.len(),
                    "sync pass completed"
                );
            }
            SyncStatus::Failed => {
                warn!(
                    sync_id = %record.sync_id,
                    phase = %SyncPhase::Failed,
                    error = record.first_error_message().unwrap_or("unknown"),
                    "sync pass terminated"
                );
            }
        }
        Ok(record)
    }

    async fn drive(
        &self,
        direction: SyncDirection,
        cancel: &CancelFlag,
        record: &mut SyncOperationRecord,
    ) -> SyncResult<()> {
        debug!(phase = %SyncPhase::DetectingConflicts, "gathering local and remote state");
        let local = self.tabs.current_tabs().await?;
        if Self::bail_if_cancelled(cancel, record, SyncPhase::DetectingConflicts) {
            return Ok(());
        }

        let remote = match self.store.retrieve(&self.config.snapshot_name).await {
            Ok(retrieved) => match Self::validate_snapshot(&retrieved) {
                Ok(()) => Some(retrieved.snapshot),
                Err(error) => {
                    warn!(%error, "remote snapshot failed validation, degrading to upload");
                    None
                }
            },
            Err(SyncError::SnapshotNotFound) => {
                info!("no remote snapshot yet, degrading to upload");
                None
            }
            Err(error) => return Err(error),
        };

        match (direction, remote) {
            (_, None) => {
                record.direction = SyncDirection::Upload;
                self.upload(&local, record).await
            }
            (SyncDirection::Upload, Some(_)) => self.upload(&local, record).await,
            (SyncDirection::Download, Some(remote)) => self.download_tabs(&remote, record).await,
            (SyncDirection::Bidirectional, Some(remote)) => {
                self.bidirectional(&local, &remote, cancel, record).await
            }
        }
    }

    async fn bidirectional(
        &self,
        local: &TabSet,
        remote: &SyncSnapshot,
        cancel: &CancelFlag,
        record: &mut SyncOperationRecord,
    ) -> SyncResult<()> {
        let device = self.device_metadata();
        let detector = ConflictDetector::with_config(device.clone(), self.config.detector);
        let conflicts = detector.detect(local, remote, self.last_sync());
        record.conflicts = conflicts.clone();
        if Self::bail_if_cancelled(cancel, record, SyncPhase::DetectingConflicts) {
            return Ok(());
        }

        if conflicts.is_empty() {
            debug!(phase = %SyncPhase::SimpleMerge, "no conflicts, newer side propagates");
            let local_max = local.max_timestamp();
            if local_max > remote.timestamp {
                record.direction = SyncDirection::Upload;
                return self.upload(local, record).await;
            }
            if remote.timestamp > local_max {
                record.direction = SyncDirection::Download;
                return self.download_tabs(remote, record).await;
            }
            debug!("both sides equally fresh, nothing to do");
            return Ok(());
        }

        debug!(
            phase = %SyncPhase::AdvancedMerge,
            conflicts = conflicts.len(),
            "resolving and merging"
        );
        let prioritized = ConflictPrioritizer::new().prioritize(&conflicts);
        let choices = self.gather_choices(&prioritized).await;
        let plan = StrategyResolver::new().resolve_all(&conflicts, &choices);
        let result = MergeEngine::new(device.device_id).merge(local, &remote.tabs, &conflicts, &plan);
        record.operations.extend(result.operations.iter().cloned());
        if !result.unresolved_conflicts.is_empty() {
            info!(
                unresolved = result.unresolved_conflicts.len(),
                "proceeding with unresolved conflicts left for the user"
            );
        }

        if Self::bail_if_cancelled(cancel, record, SyncPhase::AdvancedMerge) {
            return Ok(());
        }

        // Identity recovery happens after content decisions so it cannot
        // invalidate comparisons made during this pass.
        let mut device_id = device.device_id;
        if result
            .applied_resolutions
            .iter()
            .any(|r| r.strategy == ResolutionStrategy::RegenerateDeviceId)
        {
            device_id = self.identity.regenerate_id().await?;
            info!(new_device_id = %device_id, "recovered from device identity collision");
        }

        debug!(phase = %SyncPhase::Applying, tabs = result.merged_tabs.len(), "applying merged tabs");
        self.apply_locally(&result.merged_tabs, record).await?;

        let metadata =
            DeviceMetadata::new(device_id, &self.config.device_name, &self.config.platform);
        let snapshot = SyncSnapshot::new(metadata, result.merged_tabs.clone(), Timestamp::now());
        let receipt = self
            .store
            .store(&self.config.snapshot_name, &snapshot)
            .await?;
        record.operations.push(MergeOperation::new(
            MergeOpKind::Upload,
            format!("stored merged snapshot, {} bytes", receipt.size),
        ));
        Ok(())
    }

    async fn upload(&self, local: &TabSet, record: &mut SyncOperationRecord) -> SyncResult<()> {
        let snapshot = SyncSnapshot::new(self.device_metadata(), local.clone(), Timestamp::now());
        let receipt = self
            .store
            .store(&self.config.snapshot_name, &snapshot)
            .await?;
        record.operations.push(MergeOperation::new(
            MergeOpKind::Upload,
            format!("stored local snapshot, {} bytes", receipt.size),
        ));
        Ok(())
    }

    async fn download_tabs(
        &self,
        remote: &SyncSnapshot,
        record: &mut SyncOperationRecord,
    ) -> SyncResult<()> {
        record.operations.push(MergeOperation::new(
            MergeOpKind::Download,
            format!("adopted remote snapshot of {} tabs", remote.tabs.len()),
        ));
        self.apply_locally(&remote.tabs, record).await
    }

    async fn apply_locally(
        &self,
        tabs: &TabSet,
        record: &mut SyncOperationRecord,
    ) -> SyncResult<()> {
        let outcome = self.tabs.apply_tabs(tabs).await?;
        record.operations.push(MergeOperation::new(
            MergeOpKind::ApplyTabs,
            format!(
                "applied tabs: {} created, {} closed, {} updated",
                outcome.created, outcome.closed, outcome.updated
            ),
        ));
        if !outcome.errors.is_empty() {
            // Partial application is reported truthfully; the tab source
            // guarantees apply_tabs is safely re-invokable.
            let now = Timestamp::now();
            for message in outcome.errors {
                record
                    .errors
                    .push(SyncErrorEntry::new("tab_source", message, now));
            }
            record.status = SyncStatus::Failed;
        }
        Ok(())
    }

    async fn gather_choices(&self, conflicts: &[Conflict]) -> ResolutionChoices {
        let Some(presenter) = &self.presenter else {
            return HashMap::new();
        };
        match tokio::time::timeout(self.config.presenter_timeout, presenter.present(conflicts))
            .await
        {
            Ok(Ok(Some(choices))) => choices,
            Ok(Ok(None)) => {
                info!("presenter cancelled, falling back to default strategies");
                HashMap::new()
            }
            Ok(Err(error)) => {
                warn!(%error, "presenter failed, falling back to default strategies");
                HashMap::new()
            }
            Err(_) => {
                warn!(
                    error = %SyncError::PresenterTimeout,
                    "falling back to default strategies"
                );
                HashMap::new()
            }
        }
    }

    /// Structural validation of a retrieved snapshot. Failures degrade
    /// the pass to upload at the call site.
    fn validate_snapshot(retrieved: &RetrievedSnapshot) -> SyncResult<()> {
        let snapshot = &retrieved.snapshot;
        if snapshot.device_id.is_nil() {
            return Err(SyncError::InvalidSnapshot("nil device id".to_string()));
        }
        if snapshot.timestamp.is_zero() {
            return Err(SyncError::InvalidSnapshot("zero timestamp".to_string()));
        }
        if snapshot.device.device_id != snapshot.device_id {
            return Err(SyncError::InvalidSnapshot(
                "device metadata does not match snapshot device id".to_string(),
            ));
        }
        let mut seen_ids = HashSet::new();
        for tab in snapshot.tabs.iter() {
            if tab.url.is_empty() {
                return Err(SyncError::InvalidSnapshot("tab with empty url".to_string()));
            }
            if !seen_ids.insert(tab.id) {
                return Err(SyncError::InvalidSnapshot(format!(
                    "duplicate tab id {}",
                    tab.id
                )));
            }
        }
        Ok(())
    }

    fn bail_if_cancelled(
        cancel: &CancelFlag,
        record: &mut SyncOperationRecord,
        phase: SyncPhase,
    ) -> bool {
        if !cancel.is_cancelled() {
            return false;
        }
        info!(%phase, "sync pass cancelled, partial progress recorded");
        record.errors.push(SyncErrorEntry::new(
            "cancelled",
            format!("sync pass cancelled during {phase}"),
            Timestamp::now(),
        ));
        record.status = SyncStatus::Failed;
        true
    }

    fn device_metadata(&self) -> DeviceMetadata {
        DeviceMetadata::new(
            self.identity.current_id(),
            &self.config.device_name,
            &self.config.platform,
        )
    }
}
