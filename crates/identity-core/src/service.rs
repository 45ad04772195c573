//! Identity and token issuance

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::provider::IdentityProvider;
use crate::store::IdentityStore;
use crate::types::{AccessToken, Identity, Slot, TokenScope};

/// Fixed token validity window.
const TOKEN_TTL_HOURS: i64 = 24;

/// Slot-aware facade over the external identity provider.
///
/// The service owns the process-local [`IdentityStore`]; the slot a request
/// targets is recomputed per call from the multi-user flag and the
/// acquired-token flag, never cached. In multi-user mode a second caller
/// lands on the secondary slot only after the first caller has retrieved a
/// token, which is what makes two-tab demos pair up as distinct users.
pub struct IdentityService {
    store: IdentityStore,
    provider: Arc<dyn IdentityProvider>,
    multi_enabled: bool,
}

impl IdentityService {
    pub fn new(provider: Arc<dyn IdentityProvider>, multi_enabled: bool) -> Self {
        Self {
            store: IdentityStore::new(),
            provider,
            multi_enabled,
        }
    }

    /// Identity for the current slot, created at the provider on first
    /// access and reused afterwards.
    ///
    /// Creation does not flip the acquired-token flag, so repeated identity
    /// requests keep hitting the same slot until a token is issued.
    pub async fn get_identity(&self) -> Result<Identity> {
        let slot = self.current_slot();
        if let Some(identity) = self.store.identity(slot) {
            return Ok(identity);
        }

        let identity = self.provider.create_identity().await?;
        self.store.set_identity(slot, identity.clone());
        info!(slot = ?slot, user = %identity, "created new user identity");
        Ok(identity)
    }

    /// Fresh voice/video token for the identity in the current slot.
    ///
    /// If the slot has no identity yet, one is created first. Successful
    /// issuance flips the acquired-token flag, which moves slot selection to
    /// the secondary slot when multi-user mode is on.
    pub async fn get_token(&self) -> Result<AccessToken> {
        let identity = self.get_identity().await?;
        let token = self
            .provider
            .issue_token(&identity, &[TokenScope::Voip], Duration::hours(TOKEN_TTL_HOURS))
            .await?;
        self.store.mark_token_acquired();

        info!(user = %identity, expires_on = %token.expires_on, "issued voip token");
        debug!(token = %token.token, "token value");
        Ok(token)
    }

    pub fn multi_user_enabled(&self) -> bool {
        self.multi_enabled
    }

    fn current_slot(&self) -> Slot {
        Slot::select(self.multi_enabled, self.store.primary_token_acquired())
    }
}
