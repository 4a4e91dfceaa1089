//! Conflict detection.
//!
//! Five independent passes over a local tab set and a remote snapshot:
//! - Timestamp: concurrent modification and staleness
//! - Tab metadata: per-URL field divergence and cross-device duplicates
//! - Structural: window counts, tab order, pinned status
//! - Device: identity collisions and platform differences
//! - Window organization: tabs living in different windows per side
//!
//! Detection never mutates its inputs and holds no state between calls,
//! so a detector is safe to share across concurrent sync passes.

use crate::conflict::{Conflict, ConflictDetail, Severity, TabField, TabMove};
use std::collections::{BTreeMap, BTreeSet};
use tabsync_types::{DeviceMetadata, SyncSnapshot, TabSet, Timestamp, DAY_MS};
use tracing::debug;

/// Tuning knobs for the detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Two modifications closer together than this are concurrent rather
    /// than merely overlapping.
    pub concurrent_window_ms: u64,
    /// A side untouched for longer than this is stale.
    pub stale_after_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            concurrent_window_ms: 300_000,
            stale_after_ms: 7 * DAY_MS,
        }
    }
}

/// Detects conflicts between a local tab set and a remote snapshot.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    device: DeviceMetadata,
    config: DetectorConfig,
}

impl ConflictDetector {
    /// Creates a detector for the given local device, with default tuning.
    #[must_use]
    pub fn new(device: DeviceMetadata) -> Self {
        Self::with_config(device, DetectorConfig::default())
    }

    /// Creates a detector with explicit tuning.
    #[must_use]
    pub fn with_config(device: DeviceMetadata, config: DetectorConfig) -> Self {
        Self { device, config }
    }

    /// Runs all detection passes against the current wall clock.
    ///
    /// `last_sync` is `Timestamp::ZERO` when this device has never synced.
    #[must_use]
    pub fn detect(
        &self,
        local: &TabSet,
        remote: &SyncSnapshot,
        last_sync: Timestamp,
    ) -> Vec<Conflict> {
        self.detect_at(local, remote, last_sync, Timestamp::now())
    }

    /// Runs all detection passes against an explicit clock. Staleness is
    /// measured from `now`, so tests can pin it.
    #[must_use]
    pub fn detect_at(
        &self,
        local: &TabSet,
        remote: &SyncSnapshot,
        last_sync: Timestamp,
        now: Timestamp,
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        self.detect_timestamp(local, remote, last_sync, now, &mut conflicts);
        Self::detect_tab_metadata(local, &remote.tabs, &mut conflicts);
        Self::detect_structural(local, &remote.tabs, &mut conflicts);
        self.detect_device(remote, &mut conflicts);
        Self::detect_window_organization(local, &remote.tabs, &mut conflicts);
        debug!(
            count = conflicts.len(),
            local_tabs = local.len(),
            remote_tabs = remote.tabs.len(),
            "conflict detection finished"
        );
        conflicts
    }

    fn detect_timestamp(
        &self,
        local: &TabSet,
        remote: &SyncSnapshot,
        last_sync: Timestamp,
        now: Timestamp,
        out: &mut Vec<Conflict>,
    ) {
        let local_max = local.max_timestamp();
        let remote_ts = remote.timestamp;

        if local_max > last_sync && remote_ts > last_sync {
            let delta = local_max.delta_ms(remote_ts);
            let severity = if delta < self.config.concurrent_window_ms {
                Severity::High
            } else {
                Severity::Medium
            };
            out.push(Conflict::new(
                severity,
                format!("both sides modified since last sync, {delta}ms apart"),
                ConflictDetail::ConcurrentModification {
                    local_ts: local_max,
                    remote_ts,
                },
            ));
        }

        let local_age = local_max.age_from(now);
        if local_age > self.config.stale_after_ms && remote_ts > last_sync {
            out.push(Conflict::new(
                Severity::Medium,
                format!("local tabs are {local_age}ms old while remote has newer changes"),
                ConflictDetail::StaleLocal { age_ms: local_age },
            ));
        }

        let remote_age = remote_ts.age_from(now);
        if remote_age > self.config.stale_after_ms && local_max > last_sync {
            out.push(Conflict::new(
                Severity::Medium,
                format!("remote snapshot is {remote_age}ms old while local has newer changes"),
                ConflictDetail::StaleRemote { age_ms: remote_age },
            ));
        }
    }

    fn detect_tab_metadata(local: &TabSet, remote: &TabSet, out: &mut Vec<Conflict>) {
        let local_by_url = local.by_url();
        let remote_by_url = remote.by_url();

        // Shared URLs in deterministic order so conflict lists are stable
        // across runs.
        let mut shared: Vec<&str> = local_by_url
            .keys()
            .filter(|url| remote_by_url.contains_key(**url))
            .copied()
            .collect();
        shared.sort_unstable();

        for url in &shared {
            let local_tab = local_by_url[url];
            let remote_tab = remote_by_url[url];
            if local_tab.device_id == remote_tab.device_id {
                continue;
            }

            let mut changed = Vec::new();
            if local_tab.title != remote_tab.title {
                changed.push(TabField::Title);
            }
            if local_tab.pinned != remote_tab.pinned {
                changed.push(TabField::Pinned);
            }
            if local_tab.index != remote_tab.index {
                changed.push(TabField::Index);
            }
            if local_tab.window_id != remote_tab.window_id {
                changed.push(TabField::WindowId);
            }
            if changed.is_empty() {
                continue;
            }

            let heavy = changed.iter().filter(|f| f.weight() >= 2).count();
            let severity = if heavy > 1 {
                Severity::High
            } else {
                match changed.iter().map(TabField::weight).max().unwrap_or(1) {
                    3 => Severity::High,
                    2 => Severity::Medium,
                    _ => Severity::Low,
                }
            };
            out.push(Conflict::new(
                severity,
                format!("tab metadata diverged for {url}"),
                ConflictDetail::Modified {
                    url: (*url).to_string(),
                    local: local_tab.clone(),
                    remote: remote_tab.clone(),
                    changed_fields: changed,
                },
            ));
        }

        // Duplicates: a URL contributed by two or more distinct devices
        // across the combined sets.
        let mut by_url: BTreeMap<&str, Vec<&tabsync_types::Tab>> = BTreeMap::new();
        for tab in local.iter().chain(remote.iter()) {
            by_url.entry(tab.url.as_str()).or_default().push(tab);
        }
        for (url, tabs) in by_url {
            let devices: BTreeSet<_> = tabs.iter().map(|t| t.device_id).collect();
            if devices.len() < 2 {
                continue;
            }
            out.push(Conflict::new(
                Severity::Low,
                format!("{url} is open on {} devices", devices.len()),
                ConflictDetail::Duplicate {
                    url: url.to_string(),
                    tabs: tabs.into_iter().cloned().collect(),
                    devices: devices.into_iter().collect(),
                },
            ));
        }
    }

    fn detect_structural(local: &TabSet, remote: &TabSet, out: &mut Vec<Conflict>) {
        let local_windows = local.windows();
        let remote_windows = remote.windows();

        if local_windows.len() != remote_windows.len() {
            out.push(Conflict::new(
                Severity::Medium,
                format!(
                    "window count differs: {} local, {} remote",
                    local_windows.len(),
                    remote_windows.len()
                ),
                ConflictDetail::WindowCount {
                    local: local_windows.len(),
                    remote: remote_windows.len(),
                },
            ));
        }

        for window_id in local_windows.keys().filter(|w| remote_windows.contains_key(w)) {
            let local_order: Vec<String> = local
                .window_url_order(*window_id)
                .into_iter()
                .map(String::from)
                .collect();
            let remote_order: Vec<String> = remote
                .window_url_order(*window_id)
                .into_iter()
                .map(String::from)
                .collect();
            if local_order == remote_order {
                continue;
            }

            let remote_set: BTreeSet<&str> = remote_order.iter().map(String::as_str).collect();
            let local_set: BTreeSet<&str> = local_order.iter().map(String::as_str).collect();
            let common: Vec<String> = local_order
                .iter()
                .filter(|u| remote_set.contains(u.as_str()))
                .cloned()
                .collect();
            let local_only: Vec<String> = local_order
                .iter()
                .filter(|u| !remote_set.contains(u.as_str()))
                .cloned()
                .collect();
            let remote_only: Vec<String> = remote_order
                .iter()
                .filter(|u| !local_set.contains(u.as_str()))
                .cloned()
                .collect();

            out.push(Conflict::new(
                Severity::Low,
                format!("tab order differs in {window_id}"),
                ConflictDetail::TabOrder {
                    window_id: *window_id,
                    local_order,
                    remote_order,
                    common,
                    local_only,
                    remote_only,
                },
            ));
        }

        let local_by_url = local.by_url();
        let remote_by_url = remote.by_url();
        let mut shared: Vec<&str> = local_by_url
            .keys()
            .filter(|url| remote_by_url.contains_key(**url))
            .copied()
            .collect();
        shared.sort_unstable();
        for url in shared {
            let local_pinned = local_by_url[url].pinned;
            let remote_pinned = remote_by_url[url].pinned;
            if local_pinned != remote_pinned {
                out.push(Conflict::new(
                    Severity::Medium,
                    format!("{url} is pinned on one side only"),
                    ConflictDetail::PinnedStatus {
                        url: url.to_string(),
                        pinned_locally: local_pinned,
                    },
                ));
            }
        }
    }

    fn detect_device(&self, remote: &SyncSnapshot, out: &mut Vec<Conflict>) {
        if remote.device_id == self.device.device_id {
            out.push(Conflict::new(
                Severity::High,
                "remote snapshot claims this device's identity",
                ConflictDetail::SameDeviceId {
                    device_id: remote.device_id,
                },
            ));
        }

        let local_family = self.device.platform_family();
        let remote_family = remote.device.platform_family();
        if local_family != remote_family {
            out.push(Conflict::new(
                Severity::Low,
                format!("platform families differ: {local_family} local, {remote_family} remote"),
                ConflictDetail::PlatformDifference {
                    local: local_family.to_string(),
                    remote: remote_family.to_string(),
                },
            ));
        }
    }

    fn detect_window_organization(local: &TabSet, remote: &TabSet, out: &mut Vec<Conflict>) {
        let local_by_url = local.by_url();
        let remote_by_url = remote.by_url();

        let mut shared: Vec<&str> = local_by_url
            .keys()
            .filter(|url| remote_by_url.contains_key(**url))
            .copied()
            .collect();
        shared.sort_unstable();

        let moves: Vec<TabMove> = shared
            .into_iter()
            .filter_map(|url| {
                let local_tab = local_by_url[url];
                let remote_tab = remote_by_url[url];
                (local_tab.window_id != remote_tab.window_id).then(|| TabMove {
                    url: url.to_string(),
                    local_window: local_tab.window_id,
                    remote_window: remote_tab.window_id,
                })
            })
            .collect();

        if !moves.is_empty() {
            out.push(Conflict::new(
                Severity::Low,
                format!("{} tabs live in different windows per side", moves.len()),
                ConflictDetail::WindowOrganization { moves },
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictKind;
    use tabsync_types::{DeviceId, Tab, WindowId};

    fn device(name: &str) -> DeviceMetadata {
        DeviceMetadata::new(DeviceId::new(), name, "macOS 15.2")
    }

    fn tab(url: &str, device_id: DeviceId, ts: u64) -> Tab {
        Tab::new(url, device_id, Timestamp::from_millis(ts))
    }

    #[test]
    fn concurrent_modification_close_deltas_are_high_severity() {
        let local_dev = device("laptop");
        let remote_dev = device("desktop");
        let d1 = local_dev.device_id;

        let local = TabSet::from_tabs(vec![tab("https://a", d1, 100)]);
        let remote = SyncSnapshot::new(
            remote_dev,
            TabSet::from_tabs(vec![tab("https://a", d1, 50)]),
            Timestamp::from_millis(50),
        );

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &local,
            &remote,
            Timestamp::from_millis(10),
            Timestamp::from_millis(200),
        );

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind(), ConflictKind::Timestamp);
        assert_eq!(conflicts[0].subtype(), "concurrent_modification");
        assert_eq!(conflicts[0].severity, Severity::High);
    }

    #[test]
    fn concurrent_modification_wide_deltas_are_medium_severity() {
        let local_dev = device("laptop");
        let remote_dev = device("desktop");
        let d1 = local_dev.device_id;

        let local = TabSet::from_tabs(vec![tab("https://a", d1, 400_000)]);
        let remote = SyncSnapshot::new(
            remote_dev,
            TabSet::from_tabs(vec![tab("https://a", d1, 50)]),
            Timestamp::from_millis(50),
        );

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &local,
            &remote,
            Timestamp::from_millis(10),
            Timestamp::from_millis(500_000),
        );

        let concurrent: Vec<_> = conflicts
            .iter()
            .filter(|c| c.subtype() == "concurrent_modification")
            .collect();
        assert_eq!(concurrent.len(), 1);
        assert_eq!(concurrent[0].severity, Severity::Medium);
    }

    #[test]
    fn stale_remote_fires_when_local_changed() {
        let local_dev = device("laptop");
        let remote_dev = device("desktop");
        let now = Timestamp::from_millis(30 * DAY_MS);

        let local = TabSet::from_tabs(vec![tab(
            "https://a",
            local_dev.device_id,
            now.as_millis() - 1_000,
        )]);
        let remote = SyncSnapshot::new(remote_dev, TabSet::new(), Timestamp::from_millis(1_000));

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(&local, &remote, Timestamp::from_millis(2_000), now);

        assert!(conflicts.iter().any(|c| c.subtype() == "stale_remote"));
        assert!(!conflicts.iter().any(|c| c.subtype() == "stale_local"));
    }

    #[test]
    fn duplicate_across_devices_single_conflict() {
        let local_dev = device("laptop");
        let remote_dev = device("desktop");
        let d1 = local_dev.device_id;
        let d2 = remote_dev.device_id;

        let local = TabSet::from_tabs(vec![tab("https://x", d1, 100)]);
        let remote = SyncSnapshot::new(
            remote_dev,
            TabSet::from_tabs(vec![tab("https://x", d2, 100)]),
            Timestamp::from_millis(50),
        );

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &local,
            &remote,
            Timestamp::from_millis(60),
            Timestamp::from_millis(200),
        );

        let duplicates: Vec<_> = conflicts
            .iter()
            .filter(|c| c.subtype() == "duplicate")
            .collect();
        assert_eq!(duplicates.len(), 1);
        match &duplicates[0].detail {
            ConflictDetail::Duplicate { devices, .. } => assert_eq!(devices.len(), 2),
            other => panic!("unexpected detail: {other:?}"),
        }
        assert!(!conflicts.iter().any(|c| c.subtype() == "modified"));
    }

    #[test]
    fn modified_fields_drive_severity() {
        let local_dev = device("laptop");
        let remote_dev = device("desktop");
        let d1 = local_dev.device_id;
        let d2 = remote_dev.device_id;

        let local = TabSet::from_tabs(vec![tab("https://x", d1, 100)
            .with_title("Local")
            .with_pinned(true)]);
        let remote = SyncSnapshot::new(
            remote_dev,
            TabSet::from_tabs(vec![tab("https://x", d2, 90).with_title("Remote")]),
            Timestamp::from_millis(90),
        );

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &local,
            &remote,
            Timestamp::from_millis(200),
            Timestamp::from_millis(300),
        );

        let modified: Vec<_> = conflicts
            .iter()
            .filter(|c| c.subtype() == "modified")
            .collect();
        assert_eq!(modified.len(), 1);
        // Two fields of weight 2 (title and pinned) diverge.
        assert_eq!(modified[0].severity, Severity::High);
    }

    #[test]
    fn pinned_on_one_side_only() {
        let local_dev = device("laptop");
        let remote_dev = device("desktop");
        let d1 = local_dev.device_id;

        let local = TabSet::from_tabs(vec![tab("https://x", d1, 100).with_pinned(true)]);
        let remote = SyncSnapshot::new(
            remote_dev,
            TabSet::from_tabs(vec![tab("https://x", d1, 100)]),
            Timestamp::from_millis(100),
        );

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &local,
            &remote,
            Timestamp::from_millis(200),
            Timestamp::from_millis(300),
        );

        let pinned: Vec<_> = conflicts
            .iter()
            .filter(|c| c.subtype() == "pinned_status")
            .collect();
        assert_eq!(pinned.len(), 1);
        match &pinned[0].detail {
            ConflictDetail::PinnedStatus { pinned_locally, .. } => assert!(pinned_locally),
            other => panic!("unexpected detail: {other:?}"),
        }
    }

    #[test]
    fn window_moves_aggregate_into_one_conflict() {
        let local_dev = device("laptop");
        let remote_dev = device("desktop");
        let d1 = local_dev.device_id;

        let local = TabSet::from_tabs(vec![
            tab("https://a", d1, 100).with_position(WindowId::new(1), 0),
            tab("https://b", d1, 100).with_position(WindowId::new(1), 1),
        ]);
        let remote = SyncSnapshot::new(
            remote_dev,
            TabSet::from_tabs(vec![
                tab("https://a", d1, 100).with_position(WindowId::new(2), 0),
                tab("https://b", d1, 100).with_position(WindowId::new(3), 0),
            ]),
            Timestamp::from_millis(100),
        );

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &local,
            &remote,
            Timestamp::from_millis(200),
            Timestamp::from_millis(300),
        );

        let org: Vec<_> = conflicts
            .iter()
            .filter(|c| c.subtype() == "window_organization")
            .collect();
        assert_eq!(org.len(), 1);
        match &org[0].detail {
            ConflictDetail::WindowOrganization { moves } => assert_eq!(moves.len(), 2),
            other => panic!("unexpected detail: {other:?}"),
        }
    }

    #[test]
    fn same_device_id_collision() {
        let local_dev = device("laptop");
        let remote = SyncSnapshot::new(
            local_dev.clone(),
            TabSet::new(),
            Timestamp::from_millis(100),
        );

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &TabSet::new(),
            &remote,
            Timestamp::from_millis(200),
            Timestamp::from_millis(300),
        );

        let collision: Vec<_> = conflicts
            .iter()
            .filter(|c| c.subtype() == "same_device_id")
            .collect();
        assert_eq!(collision.len(), 1);
        assert_eq!(collision[0].severity, Severity::High);
    }

    #[test]
    fn platform_difference_is_advisory() {
        let local_dev = device("laptop");
        let remote_dev = DeviceMetadata::new(DeviceId::new(), "phone", "Android 14");
        let remote = SyncSnapshot::new(remote_dev, TabSet::new(), Timestamp::from_millis(100));

        let detector = ConflictDetector::new(local_dev);
        let conflicts = detector.detect_at(
            &TabSet::new(),
            &remote,
            Timestamp::from_millis(200),
            Timestamp::from_millis(300),
        );

        let platform: Vec<_> = conflicts
            .iter()
            .filter(|c| c.subtype() == "platform_difference")
            .collect();
        assert_eq!(platform.len(), 1);
        assert_eq!(platform[0].severity, Severity::Low);
    }
}
