//! The merge engine.
//!
//! Combines a local and a remote tab set into one merged set, honoring a
//! resolution plan. Conflict kinds are processed in a fixed order —
//! Timestamp, TabMetadata, Structural, Device — because timestamp
//! resolution establishes which side is authoritative before per-tab
//! content is reconciled, and device-identity actions must come after
//! content decisions so they cannot invalidate in-flight comparisons.
//!
//! The engine never blocks and never fails on well-formed input: an
//! unresolvable conflict flows into `MergeResult::unresolved_conflicts`
//! and the merge proceeds around it.

use crate::conflict::{Conflict, ConflictDetail};
use crate::resolution::{Resolution, ResolutionPlan, ResolutionStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tabsync_types::{DeviceId, Tab, TabSet, Timestamp, HOUR_MS};
use tracing::debug;

/// Kind of audit operation recorded during a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOpKind {
    /// A timestamp resolution established which side is authoritative.
    TimestampBias,
    /// One side's tab replaced the other's wholesale.
    SubstituteTab,
    /// Two copies of a tab were merged field by field.
    MergeMetadata,
    /// Duplicate copies collapsed down to a survivor.
    CollapseDuplicate,
    /// Duplicate copies all retained with disambiguated titles.
    ExpandDuplicate,
    /// A window-count decision for the layout step.
    WindowLayout,
    /// A tab-order decision for the layout step.
    TabOrder,
    /// A pin decision for the layout step.
    PinLayout,
    /// A window-membership decision for the layout step.
    WindowOrganization,
    /// A device-identity action.
    DeviceIdentity,
    /// A platform-aware merge note.
    PlatformMerge,
    /// Untouched tabs unioned from both sides.
    Union,
    /// The local snapshot was written to remote storage.
    Upload,
    /// The remote snapshot was applied locally.
    Download,
    /// The merged set was handed to the tab source.
    ApplyTabs,
}

impl MergeOpKind {
    /// Stable lowercase name, matching the serialized form.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TimestampBias => "timestamp_bias",
            Self::SubstituteTab => "substitute_tab",
            Self::MergeMetadata => "merge_metadata",
            Self::CollapseDuplicate => "collapse_duplicate",
            Self::ExpandDuplicate => "expand_duplicate",
            Self::WindowLayout => "window_layout",
            Self::TabOrder => "tab_order",
            Self::PinLayout => "pin_layout",
            Self::WindowOrganization => "window_organization",
            Self::DeviceIdentity => "device_identity",
            Self::PlatformMerge => "platform_merge",
            Self::Union => "union",
            Self::Upload => "upload",
            Self::Download => "download",
            Self::ApplyTabs => "apply_tabs",
        }
    }
}

impl fmt::Display for MergeOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One entry in the merge audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOperation {
    /// What happened.
    pub kind: MergeOpKind,
    /// Human-readable description.
    pub description: String,
    /// The URL concerned, when the operation is about a single tab.
    #[serde(default)]
    pub url: Option<String>,
}

impl MergeOperation {
    /// Creates an operation without a URL.
    #[must_use]
    pub fn new(kind: MergeOpKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            url: None,
        }
    }

    /// Creates an operation about a specific URL.
    #[must_use]
    pub fn for_url(kind: MergeOpKind, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            url: Some(url.into()),
        }
    }
}

/// The engine's output: the merged tab set plus a full audit of what was
/// resolved, what was not, and how.
///
/// Every input conflict's ID appears in exactly one of
/// `applied_resolutions` or `unresolved_conflicts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    /// The merged tabs, reindexed densely per window.
    pub merged_tabs: TabSet,
    /// Resolutions the engine applied.
    pub applied_resolutions: Vec<Resolution>,
    /// Conflicts left for the user to settle.
    pub unresolved_conflicts: Vec<Conflict>,
    /// Audit trail of merge decisions.
    pub operations: Vec<MergeOperation>,
}

/// Which side's copy wins ties during the union step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bias {
    Local,
    Remote,
    Neither,
}

/// Merges two tab sets under a resolution plan.
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    local_device: DeviceId,
}

impl MergeEngine {
    /// Creates an engine merging on behalf of `local_device`.
    #[must_use]
    pub fn new(local_device: DeviceId) -> Self {
        Self { local_device }
    }

    /// Merges against the current wall clock.
    #[must_use]
    pub fn merge(
        &self,
        local: &TabSet,
        remote: &TabSet,
        conflicts: &[Conflict],
        plan: &ResolutionPlan,
    ) -> MergeResult {
        self.merge_at(local, remote, conflicts, plan, Timestamp::now())
    }

    /// Merges against an explicit clock. Metadata-merged tabs are stamped
    /// with `now`, so fixing it makes the merge fully deterministic.
    #[must_use]
    pub fn merge_at(
        &self,
        local: &TabSet,
        remote: &TabSet,
        conflicts: &[Conflict],
        plan: &ResolutionPlan,
        now: Timestamp,
    ) -> MergeResult {
        let mut applied = Vec::new();
        let mut unresolved = Vec::new();
        let mut operations = Vec::new();
        // url → replacement tabs decided by a metadata resolution; these
        // URLs are excluded from the union. A keep-all entry holds every
        // surviving copy, so the output may repeat such URLs.
        let mut decided: HashMap<String, Vec<Tab>> = HashMap::new();
        let mut bias = Bias::Neither;

        // Partition conflicts by kind, preserving detection order within
        // each bucket.
        let mut buckets: [Vec<&Conflict>; 4] = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for conflict in conflicts {
            let slot = match conflict.detail {
                ConflictDetail::ConcurrentModification { .. }
                | ConflictDetail::StaleLocal { .. }
                | ConflictDetail::StaleRemote { .. } => 0,
                ConflictDetail::Modified { .. } | ConflictDetail::Duplicate { .. } => 1,
                ConflictDetail::WindowCount { .. }
                | ConflictDetail::TabOrder { .. }
                | ConflictDetail::PinnedStatus { .. }
                | ConflictDetail::WindowOrganization { .. } => 2,
                ConflictDetail::SameDeviceId { .. } | ConflictDetail::PlatformDifference { .. } => 3,
            };
            buckets[slot].push(conflict);
        }

        for bucket in &buckets {
            for conflict in bucket {
                let Some(strategy) = plan.strategy_for(conflict.id) else {
                    unresolved.push((*conflict).clone());
                    continue;
                };
                if strategy == ResolutionStrategy::Manual {
                    unresolved.push((*conflict).clone());
                    continue;
                }

                self.apply_resolution(
                    conflict,
                    strategy,
                    now,
                    &mut bias,
                    &mut decided,
                    &mut operations,
                );
                applied.push(Resolution {
                    conflict_id: conflict.id,
                    strategy,
                });
            }
        }

        let merged = self.build_merged_set(local, remote, &decided, bias, &mut operations);

        debug!(
            merged = merged.len(),
            applied = applied.len(),
            unresolved = unresolved.len(),
            operations = operations.len(),
            "merge finished"
        );

        MergeResult {
            merged_tabs: merged,
            applied_resolutions: applied,
            unresolved_conflicts: unresolved,
            operations,
        }
    }

    fn apply_resolution(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
        now: Timestamp,
        bias: &mut Bias,
        decided: &mut HashMap<String, Vec<Tab>>,
        operations: &mut Vec<MergeOperation>,
    ) {
        use ResolutionStrategy as S;
        match &conflict.detail {
            ConflictDetail::ConcurrentModification { local_ts, remote_ts } => {
                let delta = local_ts.delta_ms(*remote_ts);
                *bias = match strategy {
                    S::LocalWins => Bias::Local,
                    S::RemoteWins => Bias::Remote,
                    S::UseNewer => {
                        if *remote_ts > *local_ts {
                            Bias::Remote
                        } else {
                            Bias::Local
                        }
                    }
                    // Preserving both sides only makes sense once the
                    // edits are far enough apart to be distinct work.
                    S::PreserveBoth if delta > HOUR_MS => Bias::Neither,
                    _ => Bias::Local,
                };
                operations.push(MergeOperation::new(
                    MergeOpKind::TimestampBias,
                    format!("{strategy} for concurrent modification, {delta}ms apart"),
                ));
            }
            ConflictDetail::StaleLocal { age_ms } => {
                *bias = if strategy == S::LocalWins {
                    Bias::Local
                } else {
                    Bias::Remote
                };
                operations.push(MergeOperation::new(
                    MergeOpKind::TimestampBias,
                    format!("{strategy} for stale local side, {age_ms}ms old"),
                ));
            }
            ConflictDetail::StaleRemote { age_ms } => {
                *bias = if strategy == S::RemoteWins {
                    Bias::Remote
                } else {
                    Bias::Local
                };
                operations.push(MergeOperation::new(
                    MergeOpKind::TimestampBias,
                    format!("{strategy} for stale remote side, {age_ms}ms old"),
                ));
            }
            ConflictDetail::Modified {
                url,
                local,
                remote,
                changed_fields: _,
            } => {
                let (kind, tab) = match strategy {
                    S::RemoteWins => (MergeOpKind::SubstituteTab, remote.clone()),
                    S::MergeMetadata => (
                        MergeOpKind::MergeMetadata,
                        self.merge_tab_metadata(local, remote, now),
                    ),
                    _ => (MergeOpKind::SubstituteTab, local.clone()),
                };
                operations.push(MergeOperation::for_url(
                    kind,
                    format!("{strategy} for diverged metadata"),
                    url.clone(),
                ));
                decided.insert(url.clone(), vec![tab]);
            }
            ConflictDetail::Duplicate { url, tabs, .. } => {
                let kept = self.resolve_duplicate(tabs, strategy);
                let kind = if strategy == S::KeepAll {
                    MergeOpKind::ExpandDuplicate
                } else {
                    MergeOpKind::CollapseDuplicate
                };
                operations.push(MergeOperation::for_url(
                    kind,
                    format!("{strategy}: kept {} of {} copies", kept.len(), tabs.len()),
                    url.clone(),
                ));
                decided.insert(url.clone(), kept);
            }
            ConflictDetail::WindowCount { local, remote } => {
                operations.push(MergeOperation::new(
                    MergeOpKind::WindowLayout,
                    format!("{strategy} for window counts {local} local, {remote} remote"),
                ));
            }
            ConflictDetail::TabOrder { window_id, .. } => {
                operations.push(MergeOperation::new(
                    MergeOpKind::TabOrder,
                    format!("{strategy} for tab order in {window_id}"),
                ));
            }
            ConflictDetail::PinnedStatus { url, pinned_locally } => {
                let side = if *pinned_locally { "local" } else { "remote" };
                operations.push(MergeOperation::for_url(
                    MergeOpKind::PinLayout,
                    format!("{strategy}, pinned on {side} side"),
                    url.clone(),
                ));
            }
            ConflictDetail::WindowOrganization { moves } => {
                operations.push(MergeOperation::new(
                    MergeOpKind::WindowOrganization,
                    format!("{strategy} for {} moved tabs", moves.len()),
                ));
            }
            ConflictDetail::SameDeviceId { device_id } => {
                operations.push(MergeOperation::new(
                    MergeOpKind::DeviceIdentity,
                    format!("{strategy} for identity collision on {device_id}"),
                ));
            }
            ConflictDetail::PlatformDifference { local, remote } => {
                operations.push(MergeOperation::new(
                    MergeOpKind::PlatformMerge,
                    format!("{strategy} across {local} and {remote}"),
                ));
            }
        }
    }

    /// Field-by-field metadata merge: longer title, pinned if pinned
    /// anywhere, averaged index, local window. Remaining fields come from
    /// the side with the greater timestamp. The merged tab is restamped
    /// with `now` and owned by the local device.
    fn merge_tab_metadata(&self, local: &Tab, remote: &Tab, now: Timestamp) -> Tab {
        let newer = if remote.timestamp > local.timestamp {
            remote
        } else {
            local
        };
        Tab {
            id: local.id,
            url: local.url.clone(),
            title: if remote.title.len() > local.title.len() {
                remote.title.clone()
            } else {
                local.title.clone()
            },
            favicon: newer.favicon.clone(),
            window_id: local.window_id,
            index: (local.index + remote.index) / 2,
            pinned: local.pinned || remote.pinned,
            active: newer.active,
            timestamp: now,
            device_id: self.local_device,
            external_handle: newer.external_handle.clone(),
        }
    }

    /// Applies a duplicate-resolution strategy to the conflict's copies.
    fn resolve_duplicate(&self, tabs: &[Tab], strategy: ResolutionStrategy) -> Vec<Tab> {
        use ResolutionStrategy as S;
        match strategy {
            S::KeepLocal | S::KeepRemote => {
                let keep_local = strategy == S::KeepLocal;
                let filtered: Vec<&Tab> = tabs
                    .iter()
                    .filter(|t| (t.device_id == self.local_device) == keep_local)
                    .collect();
                if filtered.is_empty() {
                    // No copy from the requested side; fall back to the
                    // newest overall rather than dropping the URL.
                    Self::newest(tabs).into_iter().cloned().collect()
                } else {
                    Self::newest_of(&filtered).into_iter().cloned().collect()
                }
            }
            S::KeepAll => {
                let mut sorted: Vec<Tab> = tabs.to_vec();
                sorted.sort_by(|a, b| {
                    b.timestamp
                        .cmp(&a.timestamp)
                        .then_with(|| b.device_id.cmp(&a.device_id))
                });
                for (i, tab) in sorted.iter_mut().enumerate().skip(1) {
                    tab.title = format!("{} ({})", tab.title, i + 1);
                }
                sorted
            }
            _ => Self::newest(tabs).into_iter().cloned().collect(),
        }
    }

    fn newest(tabs: &[Tab]) -> Option<&Tab> {
        let refs: Vec<&Tab> = tabs.iter().collect();
        Self::newest_of(&refs)
    }

    /// Max-timestamp tab; timestamp ties break toward the greater device
    /// ID so the choice is stable across runs.
    fn newest_of<'a>(tabs: &[&'a Tab]) -> Option<&'a Tab> {
        tabs.iter()
            .copied()
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.device_id.cmp(&b.device_id))
            })
    }

    /// Unions untouched tabs from both sides, splices in decided
    /// replacements, and reindexes densely per window.
    fn build_merged_set(
        &self,
        local: &TabSet,
        remote: &TabSet,
        decided: &HashMap<String, Vec<Tab>>,
        bias: Bias,
        operations: &mut Vec<MergeOperation>,
    ) -> TabSet {
        let mut merged: Vec<Tab> = decided
            .values()
            .flat_map(|tabs| tabs.iter().cloned())
            .collect();
        // Decided tabs in deterministic order before reindexing.
        merged.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| b.timestamp.cmp(&a.timestamp)));

        let mut union_count = 0usize;
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (tab, is_local) in local
            .iter()
            .map(|t| (t, true))
            .chain(remote.iter().map(|t| (t, false)))
        {
            if decided.contains_key(&tab.url) {
                continue;
            }
            match seen.get(&tab.url) {
                None => {
                    seen.insert(tab.url.clone(), merged.len());
                    merged.push(tab.clone());
                    union_count += 1;
                }
                Some(&pos) => {
                    let existing = &merged[pos];
                    let replace = match tab.timestamp.cmp(&existing.timestamp) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Equal => !is_local && bias == Bias::Remote,
                    };
                    if replace {
                        merged[pos] = tab.clone();
                    }
                }
            }
        }
        operations.push(MergeOperation::new(
            MergeOpKind::Union,
            format!("unioned {union_count} untouched tabs"),
        ));

        // Dense 0-based indices per window.
        merged.sort_by_key(|t| (t.window_id, t.index));
        let mut next_index: HashMap<_, u32> = HashMap::new();
        for tab in &mut merged {
            let slot = next_index.entry(tab.window_id).or_insert(0);
            tab.index = *slot;
            *slot += 1;
        }

        TabSet::from_tabs(merged)
    }
}
