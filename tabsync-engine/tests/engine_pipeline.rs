//! End-to-end engine tests: detect → prioritize → resolve → merge,
//! exercised as a pipeline the way the coordinator drives it.

use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use tabsync_engine::{
    resolve_and_merge_at, Conflict, ConflictDetail, ConflictDetector, ConflictKind,
    ConflictPrioritizer, MergeOpKind, ResolutionStrategy, Severity, TabField,
};
use tabsync_types::{DeviceId, DeviceMetadata, SyncSnapshot, Tab, TabSet, Timestamp, WindowId};

// ── Helpers ──────────────────────────────────────────────────────────

fn device(name: &str) -> DeviceMetadata {
    DeviceMetadata::new(DeviceId::new(), name, "macOS 15.2")
}

fn tab(url: &str, device_id: DeviceId, ts: u64) -> Tab {
    Tab::new(url, device_id, Timestamp::from_millis(ts))
}

fn no_choices() -> HashMap<tabsync_types::ConflictId, ResolutionStrategy> {
    HashMap::new()
}

// ── Detection scenarios ──────────────────────────────────────────────

#[test]
fn close_concurrent_edits_yield_one_high_severity_conflict() {
    let local_dev = device("laptop");
    let remote_dev = device("desktop");
    let d1 = local_dev.device_id;

    let local = TabSet::from_tabs(vec![tab("https://a", d1, 100)]);
    let remote = SyncSnapshot::new(
        remote_dev,
        TabSet::from_tabs(vec![tab("https://a", d1, 50)]),
        Timestamp::from_millis(50),
    );

    let conflicts = ConflictDetector::new(local_dev).detect_at(
        &local,
        &remote,
        Timestamp::from_millis(10),
        Timestamp::from_millis(200),
    );

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind(), ConflictKind::Timestamp);
    assert_eq!(conflicts[0].subtype(), "concurrent_modification");
    assert_eq!(conflicts[0].severity, Severity::High);
    assert_eq!(conflicts[0].severity.rank(), 3);
}

#[test]
fn same_url_on_two_devices_yields_one_duplicate_conflict() {
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

    // Last sync sits between the two edits, so the timestamp pass is quiet.
    let conflicts = ConflictDetector::new(local_dev).detect_at(
        &local,
        &remote,
        Timestamp::from_millis(60),
        Timestamp::from_millis(200),
    );

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind(), ConflictKind::TabMetadata);
    assert_eq!(conflicts[0].subtype(), "duplicate");
    match &conflicts[0].detail {
        ConflictDetail::Duplicate { devices, .. } => assert_eq!(devices.len(), 2),
        other => panic!("unexpected detail: {other:?}"),
    }
}

// ── Merge scenarios ──────────────────────────────────────────────────

#[test]
fn conflict_free_merge_is_union_only() {
    let d1 = DeviceId::new();
    let local = TabSet::from_tabs(vec![tab("https://x", d1, 5)]);

    let result = resolve_and_merge_at(
        d1,
        &local,
        &TabSet::new(),
        &[],
        &no_choices(),
        Timestamp::from_millis(100),
    );

    assert_eq!(result.merged_tabs.len(), 1);
    let merged = &result.merged_tabs.tabs()[0];
    assert_eq!(merged.url, "https://x");
    assert_eq!(merged.timestamp, Timestamp::from_millis(5));
    assert_eq!(result.operations.len(), 1);
    assert_eq!(result.operations[0].kind, MergeOpKind::Union);
}

#[test]
fn merge_metadata_takes_the_longer_title() {
    let d1 = DeviceId::new();
    let d2 = DeviceId::new();
    let local_tab = tab("https://x", d1, 100).with_title("A");
    let remote_tab = tab("https://x", d2, 90).with_title("ABC");

    let conflict = Conflict::new(
        Severity::Medium,
        "tab metadata diverged for https://x",
        ConflictDetail::Modified {
            url: "https://x".into(),
            local: local_tab.clone(),
            remote: remote_tab.clone(),
            changed_fields: vec![TabField::Title],
        },
    );
    let mut choices = no_choices();
    choices.insert(conflict.id, ResolutionStrategy::MergeMetadata);

    let result = resolve_and_merge_at(
        d1,
        &TabSet::from_tabs(vec![local_tab]),
        &TabSet::from_tabs(vec![remote_tab]),
        std::slice::from_ref(&conflict),
        &choices,
        Timestamp::from_millis(200),
    );

    assert_eq!(result.merged_tabs.len(), 1);
    assert_eq!(result.merged_tabs.tabs()[0].title, "ABC");
    assert_eq!(
        result.applied_resolutions[0].strategy,
        ResolutionStrategy::MergeMetadata
    );
}

// ── Pipeline properties ──────────────────────────────────────────────

fn diverged_fixture() -> (DeviceMetadata, TabSet, SyncSnapshot) {
    let local_dev = device("laptop");
    let remote_dev = device("desktop");
    let d1 = local_dev.device_id;
    let d2 = remote_dev.device_id;

    let local = TabSet::from_tabs(vec![
        tab("https://a", d1, 100)
            .with_title("Article")
            .with_position(WindowId::new(1), 0)
            .with_pinned(true),
        tab("https://b", d1, 110).with_position(WindowId::new(1), 1),
        tab("https://c", d1, 120).with_position(WindowId::new(2), 0),
    ]);
    let remote = SyncSnapshot::new(
        remote_dev,
        TabSet::from_tabs(vec![
            tab("https://a", d2, 95)
                .with_title("Article, expanded edition")
                .with_position(WindowId::new(1), 1),
            tab("https://b", d2, 90).with_position(WindowId::new(1), 0),
            tab("https://d", d2, 105).with_position(WindowId::new(3), 0),
        ]),
        Timestamp::from_millis(105),
    );
    (local_dev, local, remote)
}

#[test]
fn every_conflict_is_applied_or_unresolved_never_both() {
    let (local_dev, local, remote) = diverged_fixture();
    let d1 = local_dev.device_id;

    let conflicts = ConflictDetector::new(local_dev).detect_at(
        &local,
        &remote,
        Timestamp::from_millis(10),
        Timestamp::from_millis(500),
    );
    assert!(!conflicts.is_empty());

    // Force one conflict to stay unresolved.
    let mut choices = no_choices();
    choices.insert(conflicts[0].id, ResolutionStrategy::Manual);

    let result = resolve_and_merge_at(
        d1,
        &local,
        &remote.tabs,
        &conflicts,
        &choices,
        Timestamp::from_millis(600),
    );

    for conflict in &conflicts {
        let applied = result
            .applied_resolutions
            .iter()
            .filter(|r| r.conflict_id == conflict.id)
            .count();
        let unresolved = result
            .unresolved_conflicts
            .iter()
            .filter(|c| c.id == conflict.id)
            .count();
        assert_eq!(applied + unresolved, 1, "conflict {} double- or un-counted", conflict.id);
    }
    assert_eq!(result.unresolved_conflicts.len(), 1);
}

#[test]
fn merged_indices_are_dense_per_window() {
    let (local_dev, local, remote) = diverged_fixture();
    let d1 = local_dev.device_id;

    let conflicts = ConflictDetector::new(local_dev).detect_at(
        &local,
        &remote,
        Timestamp::from_millis(10),
        Timestamp::from_millis(500),
    );
    let result = resolve_and_merge_at(
        d1,
        &local,
        &remote.tabs,
        &conflicts,
        &no_choices(),
        Timestamp::from_millis(600),
    );

    for (window_id, tabs) in result.merged_tabs.windows() {
        let mut indices: Vec<u32> = tabs.iter().map(|t| t.index).collect();
        indices.sort_unstable();
        let expected: Vec<u32> = (0..indices.len() as u32).collect();
        assert_eq!(indices, expected, "indices not dense in {window_id}");
    }
}

#[test]
fn merged_urls_are_unique_under_default_strategies() {
    let (local_dev, local, remote) = diverged_fixture();
    let d1 = local_dev.device_id;

    let conflicts = ConflictDetector::new(local_dev).detect_at(
        &local,
        &remote,
        Timestamp::from_millis(10),
        Timestamp::from_millis(500),
    );
    let result = resolve_and_merge_at(
        d1,
        &local,
        &remote.tabs,
        &conflicts,
        &no_choices(),
        Timestamp::from_millis(600),
    );

    let urls: HashSet<&str> = result.merged_tabs.iter().map(|t| t.url.as_str()).collect();
    assert_eq!(urls.len(), result.merged_tabs.len());
    for url in ["https://a", "https://b", "https://c", "https://d"] {
        assert!(urls.contains(url), "{url} lost in merge");
    }
}

#[test]
fn merge_is_idempotent_with_a_fixed_clock() {
    let (local_dev, local, remote) = diverged_fixture();
    let d1 = local_dev.device_id;

    let conflicts = ConflictDetector::new(local_dev).detect_at(
        &local,
        &remote,
        Timestamp::from_millis(10),
        Timestamp::from_millis(500),
    );
    let now = Timestamp::from_millis(600);

    let first = resolve_and_merge_at(d1, &local, &remote.tabs, &conflicts, &no_choices(), now);
    let second = resolve_and_merge_at(d1, &local, &remote.tabs, &conflicts, &no_choices(), now);

    assert_eq!(first.merged_tabs, second.merged_tabs);
    assert_eq!(first.applied_resolutions, second.applied_resolutions);
}

#[test]
fn prioritized_order_is_severity_then_kind_name() {
    let (local_dev, local, remote) = diverged_fixture();

    let conflicts = ConflictDetector::new(local_dev).detect_at(
        &local,
        &remote,
        Timestamp::from_millis(10),
        Timestamp::from_millis(500),
    );
    let prioritized = ConflictPrioritizer::new().prioritize(&conflicts);

    for pair in prioritized.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.severity > b.severity
                || (a.severity == b.severity && a.kind().name() <= b.kind().name()),
            "order violated between {} and {}",
            a.subtype(),
            b.subtype()
        );
    }
}
