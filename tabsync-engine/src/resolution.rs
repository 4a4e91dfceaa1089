//! Resolution strategies and the strategy resolver.
//!
//! Every conflict subtype has a fixed list of candidate strategies and a
//! fixed default. The resolver turns a set of conflicts plus optional
//! presenter choices into a `ResolutionPlan`; a choice outside the
//! subtype's candidate list is discarded in favor of the default, so a
//! confused presenter can never produce an unmergeable plan.

use crate::conflict::Conflict;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tabsync_types::ConflictId;
use tracing::warn;

/// How a conflict should be resolved during the merge.
///
/// Not every strategy applies to every subtype; `ConflictDetail::candidate_strategies`
/// defines the legal set per subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The local side's state wins.
    LocalWins,
    /// The remote side's state wins.
    RemoteWins,
    /// Keep both sides' tabs.
    PreserveBoth,
    /// The side with the newer timestamp wins.
    UseNewer,
    /// Merge diverged metadata fields field by field.
    MergeMetadata,
    /// Keep the local device's copies of a duplicated URL.
    KeepLocal,
    /// Keep the other devices' copies of a duplicated URL.
    KeepRemote,
    /// Keep only the newest copy of a duplicated URL.
    KeepNewest,
    /// Keep every copy of a duplicated URL.
    KeepAll,
    /// Combine both sides' window layouts.
    MergeWindows,
    /// Order shared tabs the local way.
    LocalOrder,
    /// Order shared tabs the remote way.
    RemoteOrder,
    /// A tab pinned anywhere stays pinned.
    KeepPinned,
    /// Unpin the disputed tab.
    RemovePin,
    /// Place shared tabs in their local windows.
    LocalOrganization,
    /// Place shared tabs in their remote windows.
    RemoteOrganization,
    /// Place each shared tab in the window of its newer copy.
    MergeSmart,
    /// Mint a fresh local device identity.
    RegenerateDeviceId,
    /// Merge with awareness of platform differences.
    PlatformAwareMerge,
    /// Leave the conflict unresolved for the user to settle later.
    Manual,
}

impl ResolutionStrategy {
    /// Stable lowercase name, matching the serialized form.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
            Self::PreserveBoth => "preserve_both",
            Self::UseNewer => "use_newer",
            Self::MergeMetadata => "merge_metadata",
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::KeepNewest => "keep_newest",
            Self::KeepAll => "keep_all",
            Self::MergeWindows => "merge_windows",
            Self::LocalOrder => "local_order",
            Self::RemoteOrder => "remote_order",
            Self::KeepPinned => "keep_pinned",
            Self::RemovePin => "remove_pin",
            Self::LocalOrganization => "local_organization",
            Self::RemoteOrganization => "remote_organization",
            Self::MergeSmart => "merge_smart",
            Self::RegenerateDeviceId => "regenerate_device_id",
            Self::PlatformAwareMerge => "platform_aware_merge",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The resolved strategy for one conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The conflict this resolution settles.
    pub conflict_id: ConflictId,
    /// The strategy the merge engine should apply.
    pub strategy: ResolutionStrategy,
}

/// A complete mapping from conflicts to strategies, ready for the merge
/// engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    resolutions: Vec<Resolution>,
}

impl ResolutionPlan {
    /// Creates a plan from resolutions.
    #[must_use]
    pub fn from_resolutions(resolutions: Vec<Resolution>) -> Self {
        Self { resolutions }
    }

    /// The strategy assigned to a conflict, if the plan covers it.
    #[must_use]
    pub fn strategy_for(&self, conflict_id: ConflictId) -> Option<ResolutionStrategy> {
        self.resolutions
            .iter()
            .find(|r| r.conflict_id == conflict_id)
            .map(|r| r.strategy)
    }

    /// All resolutions in the plan.
    #[must_use]
    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// Number of resolutions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    /// Whether the plan is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }
}

/// Maps conflicts to strategies, honoring presenter choices when they
/// are legal for the subtype and falling back to the default otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyResolver;

impl StrategyResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// The default strategy for a conflict: the first entry of its
    /// subtype's candidate list.
    #[must_use]
    pub fn default_strategy(&self, conflict: &Conflict) -> ResolutionStrategy {
        conflict.detail.candidate_strategies()[0]
    }

    /// Resolves one conflict. A supplied choice is honored only when the
    /// subtype's candidate list contains it; an illegal choice falls back
    /// to the default.
    #[must_use]
    pub fn resolve(&self, conflict: &Conflict, choice: Option<ResolutionStrategy>) -> Resolution {
        let default = self.default_strategy(conflict);
        let strategy = match choice {
            Some(chosen) if conflict.detail.candidate_strategies().contains(&chosen) => chosen,
            Some(chosen) => {
                warn!(
                    conflict_id = %conflict.id,
                    subtype = conflict.subtype(),
                    chosen = chosen.name(),
                    fallback = default.name(),
                    "ignoring strategy not applicable to conflict subtype"
                );
                default
            }
            None => default,
        };
        Resolution {
            conflict_id: conflict.id,
            strategy,
        }
    }

    /// Resolves every conflict into a plan. `choices` maps conflict IDs
    /// to presenter selections; conflicts without an entry get their
    /// subtype default.
    #[must_use]
    pub fn resolve_all(
        &self,
        conflicts: &[Conflict],
        choices: &HashMap<ConflictId, ResolutionStrategy>,
    ) -> ResolutionPlan {
        let resolutions = conflicts
            .iter()
            .map(|c| self.resolve(c, choices.get(&c.id).copied()))
            .collect();
        ResolutionPlan::from_resolutions(resolutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictDetail, Severity};
    use tabsync_types::Timestamp;

    fn concurrent_conflict() -> Conflict {
        Conflict::new(
            Severity::High,
            "both sides modified recently",
            ConflictDetail::ConcurrentModification {
                local_ts: Timestamp::from_millis(1_000),
                remote_ts: Timestamp::from_millis(2_000),
            },
        )
    }

    #[test]
    fn default_is_first_candidate() {
        let conflict = concurrent_conflict();
        let resolver = StrategyResolver::new();
        let resolution = resolver.resolve(&conflict, None);
        assert_eq!(resolution.strategy, ResolutionStrategy::LocalWins);
    }

    #[test]
    fn legal_choice_is_honored() {
        let conflict = concurrent_conflict();
        let resolver = StrategyResolver::new();
        let resolution = resolver.resolve(&conflict, Some(ResolutionStrategy::UseNewer));
        assert_eq!(resolution.strategy, ResolutionStrategy::UseNewer);
    }

    #[test]
    fn illegal_choice_falls_back_to_default() {
        let conflict = concurrent_conflict();
        let resolver = StrategyResolver::new();
        let resolution = resolver.resolve(&conflict, Some(ResolutionStrategy::KeepPinned));
        assert_eq!(resolution.strategy, ResolutionStrategy::LocalWins);
    }

    #[test]
    fn resolve_all_covers_every_conflict() {
        let conflicts = vec![concurrent_conflict(), concurrent_conflict()];
        let mut choices = HashMap::new();
        choices.insert(conflicts[1].id, ResolutionStrategy::RemoteWins);

        let plan = StrategyResolver::new().resolve_all(&conflicts, &choices);
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan.strategy_for(conflicts[0].id),
            Some(ResolutionStrategy::LocalWins)
        );
        assert_eq!(
            plan.strategy_for(conflicts[1].id),
            Some(ResolutionStrategy::RemoteWins)
        );
    }
}
