//! Sync snapshots — the unit exchanged with remote storage.
//!
//! A snapshot is one device's serialized tab set plus device and timing
//! metadata. Remote storage always holds a single collapsed snapshot,
//! even if many devices have contributed to it over time.

use crate::{DeviceId, TabSet, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized platform family, derived from the free-form platform string
/// a device reports. Used only for advisory platform-difference detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Mac,
    Windows,
    Linux,
    Mobile,
    Other,
}

impl PlatformFamily {
    /// Normalizes a free-form platform string ("macOS 15.2", "Win32",
    /// "Android 14", ...) into a family.
    #[must_use]
    pub fn from_platform(platform: &str) -> Self {
        let p = platform.to_ascii_lowercase();
        if p.contains("mac") || p.contains("darwin") || p.contains("os x") {
            Self::Mac
        } else if p.contains("win") {
            Self::Windows
        } else if p.contains("android") || p.contains("ios") || p.contains("mobile") {
            Self::Mobile
        } else if p.contains("linux") || p.contains("cros") {
            Self::Linux
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mac => "mac",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Mobile => "mobile",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// Metadata describing the device that produced a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// The device's ID.
    pub device_id: DeviceId,
    /// Human-readable device name.
    pub name: String,
    /// Free-form platform string as reported by the device.
    pub platform: String,
}

impl DeviceMetadata {
    /// Creates device metadata.
    #[must_use]
    pub fn new(device_id: DeviceId, name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            device_id,
            name: name.into(),
            platform: platform.into(),
        }
    }

    /// The normalized platform family.
    #[must_use]
    pub fn platform_family(&self) -> PlatformFamily {
        PlatformFamily::from_platform(&self.platform)
    }
}

/// A device's tab set at one instant, plus metadata — the unit stored
/// and retrieved remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Device that produced the snapshot.
    pub device_id: DeviceId,
    /// When the snapshot was taken.
    pub timestamp: Timestamp,
    /// The tabs.
    pub tabs: TabSet,
    /// Device metadata.
    pub device: DeviceMetadata,
}

impl SyncSnapshot {
    /// Creates a snapshot of the given tab set.
    #[must_use]
    pub fn new(device: DeviceMetadata, tabs: TabSet, timestamp: Timestamp) -> Self {
        Self {
            device_id: device.device_id,
            timestamp,
            tabs,
            device,
        }
    }

    /// Serializes the snapshot to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserializes a snapshot from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
