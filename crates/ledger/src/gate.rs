//! Pause and allow-list pass-through checks.

use std::sync::Arc;
use stakelock_collaborators::{AllowList, Gatekeeper};
use stakelock_domain::{Address, LedgerError};

/// Thin pass-through to the external pause switch and the optional
/// allow-list. Consulted, never owned, by lifecycle operations, and
/// always before any state is touched.
pub struct AccessGate {
    gatekeeper: Arc<dyn Gatekeeper>,
    allow_list: Option<Arc<dyn AllowList>>,
}

impl AccessGate {
    #[must_use]
    pub fn new(gatekeeper: Arc<dyn Gatekeeper>) -> Self {
        Self {
            gatekeeper,
            allow_list: None,
        }
    }

    /// Configures the allow-list. No list means unrestricted access.
    pub fn set_allow_list(&mut self, allow_list: Arc<dyn AllowList>) {
        self.allow_list = Some(allow_list);
    }

    /// Rejects with `Paused` while the gatekeeper reports a pause.
    pub async fn ensure_not_paused(&self) -> Result<(), LedgerError> {
        if self.gatekeeper.is_paused().await {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    /// Rejects recipients the configured allow-list denies.
    pub async fn ensure_can_receive(&self, recipient: &Address) -> Result<(), LedgerError> {
        if let Some(allow_list) = &self.allow_list {
            if !allow_list.has_access(recipient).await? {
                return Err(LedgerError::AccessDenied(recipient.clone()));
            }
        }
        Ok(())
    }
}
