//! Tab state and per-device tab collections.
//!
//! A `Tab` is one browser tab's synchronizable state. A `TabSet` is the
//! ordered collection of tabs owned by one device at one instant — the
//! unit the conflict engine compares. Neither is persisted by the core.

use crate::{DeviceId, TabId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifier of a browser window, local to one device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct WindowId(u32);

impl WindowId {
    /// Creates a window ID from its numeric value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// One browser tab's synchronizable state.
///
/// The `external_handle` is opaque to the core; it belongs to the
/// tab-source collaborator (typically the browser-native tab id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    /// Unique identifier for this tab record.
    pub id: TabId,
    /// The tab's URL. Merged results are unique by URL unless a duplicate
    /// conflict was explicitly resolved as keep-all.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Favicon URL, if known.
    #[serde(default)]
    pub favicon: Option<String>,
    /// Window the tab lives in.
    pub window_id: WindowId,
    /// Position within the window.
    pub index: u32,
    /// Whether the tab is pinned.
    pub pinned: bool,
    /// Whether the tab is the active one in its window.
    pub active: bool,
    /// Last modification time of this tab's state.
    pub timestamp: Timestamp,
    /// Device that produced this tab state.
    pub device_id: DeviceId,
    /// Opaque handle owned by the tab-source collaborator.
    #[serde(default)]
    pub external_handle: Option<String>,
}

impl Tab {
    /// Creates a tab with the given URL, owned by `device_id`.
    #[must_use]
    pub fn new(url: impl Into<String>, device_id: DeviceId, timestamp: Timestamp) -> Self {
        Self {
            id: TabId::new(),
            url: url.into(),
            title: String::new(),
            favicon: None,
            window_id: WindowId::default(),
            index: 0,
            pinned: false,
            active: false,
            timestamp,
            device_id,
            external_handle: None,
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the window and index position.
    #[must_use]
    pub fn with_position(mut self, window_id: WindowId, index: u32) -> Self {
        self.window_id = window_id;
        self.index = index;
        self
    }

    /// Sets the pinned flag.
    #[must_use]
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Sets the favicon URL.
    #[must_use]
    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.favicon = Some(favicon.into());
        self
    }

    /// Sets the opaque tab-source handle.
    #[must_use]
    pub fn with_external_handle(mut self, handle: impl Into<String>) -> Self {
        self.external_handle = Some(handle.into());
        self
    }
}

/// Ordered collection of tabs owned by one device at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabSet(Vec<Tab>);

impl TabSet {
    /// Creates an empty tab set.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a tab set from a vector of tabs.
    #[must_use]
    pub fn from_tabs(tabs: Vec<Tab>) -> Self {
        Self(tabs)
    }

    /// Number of tabs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds a tab.
    pub fn push(&mut self, tab: Tab) {
        self.0.push(tab);
    }

    /// The tabs as a slice.
    #[must_use]
    pub fn tabs(&self) -> &[Tab] {
        &self.0
    }

    /// Consumes the set, returning the tabs.
    #[must_use]
    pub fn into_tabs(self) -> Vec<Tab> {
        self.0
    }

    /// Iterates over the tabs.
    pub fn iter(&self) -> impl Iterator<Item = &Tab> {
        self.0.iter()
    }

    /// Builds a url → tab lookup map. When a URL appears more than once,
    /// the copy with the greater timestamp wins the map slot.
    #[must_use]
    pub fn by_url(&self) -> HashMap<&str, &Tab> {
        let mut map: HashMap<&str, &Tab> = HashMap::new();
        for tab in &self.0 {
            map.entry(tab.url.as_str())
                .and_modify(|existing| {
                    if tab.timestamp > existing.timestamp {
                        *existing = tab;
                    }
                })
                .or_insert(tab);
        }
        map
    }

    /// Groups tabs by window, preserving deterministic window order.
    #[must_use]
    pub fn windows(&self) -> BTreeMap<WindowId, Vec<&Tab>> {
        let mut map: BTreeMap<WindowId, Vec<&Tab>> = BTreeMap::new();
        for tab in &self.0 {
            map.entry(tab.window_id).or_default().push(tab);
        }
        map
    }

    /// URLs in a window, sorted by tab index.
    #[must_use]
    pub fn window_url_order(&self, window_id: WindowId) -> Vec<&str> {
        let mut tabs: Vec<&Tab> = self
            .0
            .iter()
            .filter(|t| t.window_id == window_id)
            .collect();
        tabs.sort_by_key(|t| t.index);
        tabs.iter().map(|t| t.url.as_str()).collect()
    }

    /// Greatest tab timestamp in the set, or `Timestamp::ZERO` if empty.
    #[must_use]
    pub fn max_timestamp(&self) -> Timestamp {
        self.0
            .iter()
            .map(|t| t.timestamp)
            .max()
            .unwrap_or(Timestamp::ZERO)
    }
}

impl IntoIterator for TabSet {
    type Item = Tab;
    type IntoIter = std::vec::IntoIter<Tab>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TabSet {
    type Item = &'a Tab;
    type IntoIter = std::slice::Iter<'a, Tab>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Tab> for TabSet {
    fn from_iter<I: IntoIterator<Item = Tab>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
