//! The tab-source boundary.
//!
//! Everything that touches an actual browser lives behind `TabSource`:
//! enumerating open tabs and materializing a merged set. The engine only
//! ever sees `TabSet` values.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use tabsync_types::TabSet;

/// What happened when a merged tab set was applied to the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Tabs newly opened.
    pub created: usize,
    /// Tabs closed.
    pub closed: usize,
    /// Tabs whose state was updated in place.
    pub updated: usize,
    /// Per-tab failures. A partially applied set is reported, not hidden,
    /// and `apply_tabs` must be safely re-invokable afterwards.
    pub errors: Vec<String>,
}

/// Read and write access to the device's live tabs.
#[async_trait]
pub trait TabSource: Send + Sync {
    /// Snapshot of the currently open tabs.
    async fn current_tabs(&self) -> SyncResult<TabSet>;

    /// Materializes the given tab set in the browser.
    async fn apply_tabs(&self, tabs: &TabSet) -> SyncResult<ApplyOutcome>;
}

/// In-memory tab source for tests: holds a tab set, records every
/// applied set, and can be told to fail.
#[derive(Debug, Default)]
pub struct MockTabSource {
    tabs: Mutex<TabSet>,
    applied: Mutex<Vec<TabSet>>,
    fail_reads: Mutex<Option<String>>,
    fail_applies: Mutex<Option<String>>,
}

impl MockTabSource {
    /// Creates a mock holding the given tabs.
    #[must_use]
    pub fn new(tabs: TabSet) -> Self {
        Self {
            tabs: Mutex::new(tabs),
            ..Self::default()
        }
    }

    /// Replaces the held tabs.
    pub fn set_tabs(&self, tabs: TabSet) {
        *self.tabs.lock().unwrap() = tabs;
    }

    /// Every tab set handed to `apply_tabs`, oldest first.
    #[must_use]
    pub fn applied(&self) -> Vec<TabSet> {
        self.applied.lock().unwrap().clone()
    }

    /// Makes all subsequent reads fail with the given message.
    pub fn fail_reads(&self, message: impl Into<String>) {
        *self.fail_reads.lock().unwrap() = Some(message.into());
    }

    /// Makes all subsequent applies fail with the given message.
    pub fn fail_applies(&self, message: impl Into<String>) {
        *self.fail_applies.lock().unwrap() = Some(message.into());
    }
}

#[async_trait]
impl TabSource for MockTabSource {
    async fn current_tabs(&self) -> SyncResult<TabSet> {
        if let Some(message) = self.fail_reads.lock().unwrap().clone() {
            return Err(SyncError::TabSource(message));
        }
        Ok(self.tabs.lock().unwrap().clone())
    }

    async fn apply_tabs(&self, tabs: &TabSet) -> SyncResult<ApplyOutcome> {
        if let Some(message) = self.fail_applies.lock().unwrap().clone() {
            return Err(SyncError::TabSource(message));
        }

        let mut current = self.tabs.lock().unwrap();
        let before: HashSet<&str> = current.iter().map(|t| t.url.as_str()).collect();
        let after: HashSet<&str> = tabs.iter().map(|t| t.url.as_str()).collect();
        let outcome = ApplyOutcome {
            created: after.difference(&before).count(),
            closed: before.difference(&after).count(),
            updated: after.intersection(&before).count(),
            errors: Vec::new(),
        };
        *current = tabs.clone();
        drop(current);

        self.applied.lock().unwrap().push(tabs.clone());
        Ok(outcome)
    }
}
