//! Conflict model.
//!
//! A `Conflict` is one detected divergence between the local and remote
//! tab sets. Its `ConflictDetail` payload carries everything a resolver
//! or presenter needs: the subtype, the tabs involved, and the evidence
//! the detector gathered. Conflicts serialize with a `subtype` tag so
//! presenters on other platforms can dispatch without knowing the Rust
//! enum layout.

use crate::resolution::ResolutionStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabsync_types::{ConflictId, DeviceId, Tab, Timestamp, WindowId};

/// How severe a conflict is, on a closed three-level scale.
///
/// Ordering follows rank: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Numeric rank: 1, 2, or 3.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{name}")
    }
}

/// Top-level conflict category. Each detection pass produces conflicts
/// of exactly one kind; the merge engine processes kinds in a fixed
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Timestamp,
    TabMetadata,
    Structural,
    Device,
}

impl ConflictKind {
    /// Stable lowercase name, used for record serialization and for
    /// deterministic kind-name ordering in the prioritizer.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::TabMetadata => "tab_metadata",
            Self::Structural => "structural",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A tab field that can diverge between two copies of the same URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabField {
    Title,
    Pinned,
    Index,
    WindowId,
}

impl TabField {
    /// Severity weight of a divergence in this field. Window membership
    /// is the most disruptive change; position within a window the least.
    #[must_use]
    pub fn weight(&self) -> u8 {
        match self {
            Self::WindowId => 3,
            Self::Pinned | Self::Title => 2,
            Self::Index => 1,
        }
    }
}

/// One tab's window membership differing between sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabMove {
    /// URL of the moved tab.
    pub url: String,
    /// Window the tab occupies locally.
    pub local_window: WindowId,
    /// Window the tab occupies remotely.
    pub remote_window: WindowId,
}

/// Subtype-specific payload of a conflict.
///
/// Serialized with a `subtype` tag and a `details` body, so external
/// presenters can match on the tag string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", content = "details", rename_all = "snake_case")]
pub enum ConflictDetail {
    /// Both sides modified within the concurrency window.
    ConcurrentModification {
        local_ts: Timestamp,
        remote_ts: Timestamp,
    },
    /// The local set has not changed for longer than the staleness bound.
    StaleLocal { age_ms: u64 },
    /// The remote snapshot has not changed for longer than the staleness bound.
    StaleRemote { age_ms: u64 },
    /// The same URL exists on both sides with diverged metadata.
    Modified {
        url: String,
        local: Tab,
        remote: Tab,
        changed_fields: Vec<TabField>,
    },
    /// A URL appears more than once across the combined sets.
    Duplicate {
        url: String,
        tabs: Vec<Tab>,
        devices: Vec<DeviceId>,
    },
    /// The two sides organize tabs into different numbers of windows.
    WindowCount { local: usize, remote: usize },
    /// A window's shared tabs appear in different orders on each side.
    TabOrder {
        window_id: WindowId,
        local_order: Vec<String>,
        remote_order: Vec<String>,
        common: Vec<String>,
        local_only: Vec<String>,
        remote_only: Vec<String>,
    },
    /// A URL is pinned on one side and unpinned on the other.
    PinnedStatus { url: String, pinned_locally: bool },
    /// Shared tabs live in different windows on each side.
    WindowOrganization { moves: Vec<TabMove> },
    /// Local and remote snapshots claim the same device ID.
    SameDeviceId { device_id: DeviceId },
    /// The two sides run on different platform families. Advisory only.
    PlatformDifference { local: String, remote: String },
}

impl ConflictDetail {
    /// The category this detail belongs to.
    #[must_use]
    pub fn kind(&self) -> ConflictKind {
        match self {
            Self::ConcurrentModification { .. } | Self::StaleLocal { .. } | Self::StaleRemote { .. } => {
                ConflictKind::Timestamp
            }
            Self::Modified { .. } | Self::Duplicate { .. } => ConflictKind::TabMetadata,
            Self::WindowCount { .. }
            | Self::TabOrder { .. }
            | Self::PinnedStatus { .. }
            | Self::WindowOrganization { .. } => ConflictKind::Structural,
            Self::SameDeviceId { .. } | Self::PlatformDifference { .. } => ConflictKind::Device,
        }
    }

    /// Stable subtype tag, matching the serialized `subtype` field.
    #[must_use]
    pub fn subtype(&self) -> &'static str {
        match self {
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::StaleLocal { .. } => "stale_local",
            Self::StaleRemote { .. } => "stale_remote",
            Self::Modified { .. } => "modified",
            Self::Duplicate { .. } => "duplicate",
            Self::WindowCount { .. } => "window_count",
            Self::TabOrder { .. } => "tab_order",
            Self::PinnedStatus { .. } => "pinned_status",
            Self::WindowOrganization { .. } => "window_organization",
            Self::SameDeviceId { .. } => "same_device_id",
            Self::PlatformDifference { .. } => "platform_difference",
        }
    }

    /// Strategies a presenter may legally choose for this subtype. The
    /// first entry is the default; `Manual` is always available.
    #[must_use]
    pub fn candidate_strategies(&self) -> &'static [ResolutionStrategy] {
        use ResolutionStrategy as S;
        match self {
            Self::ConcurrentModification { .. } => &[
                S::LocalWins,
                S::RemoteWins,
                S::PreserveBoth,
                S::UseNewer,
                S::Manual,
            ],
            Self::StaleLocal { .. } => &[S::RemoteWins, S::LocalWins, S::Manual],
            Self::StaleRemote { .. } => &[S::LocalWins, S::RemoteWins, S::Manual],
            Self::Modified { .. } => &[S::MergeMetadata, S::LocalWins, S::RemoteWins, S::Manual],
            Self::Duplicate { .. } => &[
                S::KeepNewest,
                S::KeepLocal,
                S::KeepRemote,
                S::KeepAll,
                S::Manual,
            ],
            Self::WindowCount { .. } => &[S::MergeWindows, S::LocalWins, S::RemoteWins, S::Manual],
            Self::TabOrder { .. } => &[S::LocalOrder, S::RemoteOrder, S::Manual],
            Self::PinnedStatus { .. } => &[S::KeepPinned, S::RemovePin, S::Manual],
            Self::WindowOrganization { .. } => &[
                S::LocalOrganization,
                S::RemoteOrganization,
                S::MergeSmart,
                S::Manual,
            ],
            Self::SameDeviceId { .. } => &[S::RegenerateDeviceId, S::Manual],
            Self::PlatformDifference { .. } => &[
                S::PlatformAwareMerge,
                S::LocalWins,
                S::RemoteWins,
                S::Manual,
            ],
        }
    }

    /// The URL this conflict is about, when it concerns a single tab.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Modified { url, .. }
            | Self::Duplicate { url, .. }
            | Self::PinnedStatus { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// One detected divergence between the local and remote tab sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique, time-ordered identifier.
    pub id: ConflictId,
    /// Assigned severity.
    pub severity: Severity,
    /// Human-readable one-line description.
    pub description: String,
    /// Subtype-specific payload.
    pub detail: ConflictDetail,
}

impl Conflict {
    /// Creates a conflict with a fresh ID.
    #[must_use]
    pub fn new(severity: Severity, description: impl Into<String>, detail: ConflictDetail) -> Self {
        Self {
            id: ConflictId::new(),
            severity,
            description: description.into(),
            detail,
        }
    }

    /// The conflict's category.
    #[must_use]
    pub fn kind(&self) -> ConflictKind {
        self.detail.kind()
    }

    /// The conflict's subtype tag.
    #[must_use]
    pub fn subtype(&self) -> &'static str {
        self.detail.subtype()
    }

    /// The URL this conflict is about, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.detail.url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_rank() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::High.rank(), 3);
    }

    #[test]
    fn detail_kind_assignment() {
        let d = ConflictDetail::StaleLocal { age_ms: 1 };
        assert_eq!(d.kind(), ConflictKind::Timestamp);

        let d = ConflictDetail::WindowOrganization { moves: vec![] };
        assert_eq!(d.kind(), ConflictKind::Structural);

        let d = ConflictDetail::SameDeviceId {
            device_id: DeviceId::new(),
        };
        assert_eq!(d.kind(), ConflictKind::Device);
    }

    #[test]
    fn every_subtype_offers_manual() {
        let details = [
            ConflictDetail::ConcurrentModification {
                local_ts: Timestamp::ZERO,
                remote_ts: Timestamp::ZERO,
            },
            ConflictDetail::StaleLocal { age_ms: 0 },
            ConflictDetail::StaleRemote { age_ms: 0 },
            ConflictDetail::Duplicate {
                url: "https://example.com".into(),
                tabs: vec![],
                devices: vec![],
            },
            ConflictDetail::WindowCount { local: 1, remote: 2 },
            ConflictDetail::PinnedStatus {
                url: "https://example.com".into(),
                pinned_locally: true,
            },
            ConflictDetail::WindowOrganization { moves: vec![] },
            ConflictDetail::SameDeviceId {
                device_id: DeviceId::new(),
            },
            ConflictDetail::PlatformDifference {
                local: "mac".into(),
                remote: "windows".into(),
            },
        ];
        for d in &details {
            assert!(
                d.candidate_strategies().contains(&ResolutionStrategy::Manual),
                "{} lacks manual escape hatch",
                d.subtype()
            );
        }
    }

    #[test]
    fn subtype_tag_round_trips() {
        let detail = ConflictDetail::PinnedStatus {
            url: "https://example.com".into(),
            pinned_locally: true,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["subtype"], "pinned_status");
        let back: ConflictDetail = serde_json::from_value(json).unwrap();
        assert_eq!(back, detail);
    }

    #[test]
    fn field_weights() {
        assert_eq!(TabField::WindowId.weight(), 3);
        assert_eq!(TabField::Pinned.weight(), 2);
        assert_eq!(TabField::Title.weight(), 2);
        assert_eq!(TabField::Index.weight(), 1);
    }
}
