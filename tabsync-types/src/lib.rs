//! Core type definitions for TabSync.
//!
//! This crate defines the fundamental, browser-agnostic types used
//! throughout the sync engine:
//! - Device, tab, conflict, and sync-pass identifiers (UUID v7)
//! - Wall-clock millisecond timestamps
//! - Tab state and per-device tab collections
//! - Sync snapshots and device metadata
//!
//! Everything that talks to an actual browser (tab enumeration, window
//! layout) belongs to the tab-source collaborator, not here.

mod ids;
mod snapshot;
mod tab;
mod timestamp;

pub use ids::{ConflictId, DeviceId, SyncId, TabId};
pub use snapshot::{DeviceMetadata, PlatformFamily, SyncSnapshot};
pub use tab::{Tab, TabSet, WindowId};
pub use timestamp::{Timestamp, DAY_MS, HOUR_MS, MINUTE_MS, SECOND_MS};
