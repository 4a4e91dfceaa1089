//! The device-identity boundary.
//!
//! A device's identity is stable across passes but must be replaceable:
//! an identity collision detected against the remote snapshot is
//! recovered by minting a fresh ID.

use crate::error::SyncResult;
use async_trait::async_trait;
use std::sync::Mutex;
use tabsync_types::DeviceId;
use tracing::info;

/// Owns this device's identity.
#[async_trait]
pub trait DeviceIdentity: Send + Sync {
    /// The current device ID.
    fn current_id(&self) -> DeviceId;

    /// Replaces the identity with a freshly minted ID and returns it.
    async fn regenerate_id(&self) -> SyncResult<DeviceId>;
}

/// Process-local identity. Suits tests and single-run tools; durable
/// implementations persist the ID wherever device config lives.
#[derive(Debug)]
pub struct EphemeralIdentity {
    id: Mutex<DeviceId>,
}

impl EphemeralIdentity {
    /// Creates an identity with a fresh ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(DeviceId::new())
    }

    /// Creates an identity with a known ID.
    #[must_use]
    pub fn with_id(id: DeviceId) -> Self {
        Self { id: Mutex::new(id) }
    }
}

impl Default for EphemeralIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceIdentity for EphemeralIdentity {
    fn current_id(&self) -> DeviceId {
        *self.id.lock().unwrap()
    }

    async fn regenerate_id(&self) -> SyncResult<DeviceId> {
        let new_id = DeviceId::new();
        let mut id = self.id.lock().unwrap();
        let old_id = *id;
        *id = new_id;
        drop(id);
        info!(%old_id, %new_id, "device identity regenerated");
        Ok(new_id)
    }
}
