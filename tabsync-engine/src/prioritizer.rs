//! Conflict prioritization.
//!
//! A stable ordering over conflicts (severity descending, then kind name
//! ascending) plus grouping helpers for diagnostics. No decision logic
//! lives here; the resolver and merge engine consume conflicts in
//! whatever order they are handed.

use crate::conflict::{Conflict, Severity};
use std::collections::BTreeMap;

/// Orders and groups conflicts for presentation and diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictPrioritizer;

impl ConflictPrioritizer {
    /// Creates a prioritizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the conflicts sorted by severity descending, then kind
    /// name ascending. The sort is stable: conflicts that compare equal
    /// keep their detection order.
    #[must_use]
    pub fn prioritize(&self, conflicts: &[Conflict]) -> Vec<Conflict> {
        let mut sorted = conflicts.to_vec();
        sorted.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.kind().name().cmp(b.kind().name()))
        });
        sorted
    }

    /// Groups conflicts by `(kind, subtype)`, preserving input order
    /// within each group.
    #[must_use]
    pub fn group_by_subtype<'a>(
        &self,
        conflicts: &'a [Conflict],
    ) -> BTreeMap<(&'static str, &'static str), Vec<&'a Conflict>> {
        let mut groups: BTreeMap<(&'static str, &'static str), Vec<&Conflict>> = BTreeMap::new();
        for conflict in conflicts {
            groups
                .entry((conflict.kind().name(), conflict.subtype()))
                .or_default()
                .push(conflict);
        }
        groups
    }

    /// Groups conflicts by severity, preserving input order within each
    /// group.
    #[must_use]
    pub fn group_by_severity<'a>(
        &self,
        conflicts: &'a [Conflict],
    ) -> BTreeMap<Severity, Vec<&'a Conflict>> {
        let mut groups: BTreeMap<Severity, Vec<&Conflict>> = BTreeMap::new();
        for conflict in conflicts {
            groups.entry(conflict.severity).or_default().push(conflict);
        }
        groups
    }
}
