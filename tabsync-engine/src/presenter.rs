//! The conflict-presenter boundary.
//!
//! When a sync pass detects conflicts and a presenter is configured, the
//! coordinator offers the conflicts for human resolution under a bounded
//! wait. A presenter that answers `None` has cancelled; the coordinator
//! falls back to default strategies either way.

use crate::conflict::Conflict;
use crate::error::SyncResult;
use crate::resolution::ResolutionStrategy;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tabsync_types::ConflictId;

/// Choices a presenter returns: conflict ID to selected strategy.
/// Conflicts without an entry fall back to their subtype default.
pub type ResolutionChoices = HashMap<ConflictId, ResolutionStrategy>;

/// Offers conflicts to a human and collects strategy choices.
#[async_trait]
pub trait ConflictPresenter: Send + Sync {
    /// Presents the conflicts. `Ok(None)` means the user cancelled.
    async fn present(&self, conflicts: &[Conflict]) -> SyncResult<Option<ResolutionChoices>>;
}

/// Test presenter that answers from a script, optionally after a delay
/// so timeout behavior can be exercised.
#[derive(Debug, Default)]
pub struct ScriptedPresenter {
    choices: ResolutionChoices,
    cancels: bool,
    delay: Option<Duration>,
}

impl ScriptedPresenter {
    /// Answers with the given choices.
    #[must_use]
    pub fn answering(choices: ResolutionChoices) -> Self {
        Self {
            choices,
            cancels: false,
            delay: None,
        }
    }

    /// Always cancels.
    #[must_use]
    pub fn cancelling() -> Self {
        Self {
            cancels: true,
            ..Self::default()
        }
    }

    /// Waits before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ConflictPresenter for ScriptedPresenter {
    async fn present(&self, _conflicts: &[Conflict]) -> SyncResult<Option<ResolutionChoices>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.cancels {
            Ok(None)
        } else {
            Ok(Some(self.choices.clone()))
        }
    }
}
