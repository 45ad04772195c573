//! In-memory identity slot storage

use parking_lot::RwLock;

use crate::types::{Identity, Slot};

/// Process-local storage for the two identity slots and the token flag.
///
/// Identities are created once and reused for the process lifetime; nothing
/// is persisted durably. A restart starts over with empty slots.
#[derive(Debug, Default)]
pub struct IdentityStore {
    inner: RwLock<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    primary: Option<Identity>,
    secondary: Option<Identity>,
    primary_token_acquired: bool,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity currently stored in `slot`, if any.
    pub fn identity(&self, slot: Slot) -> Option<Identity> {
        let state = self.inner.read();
        match slot {
            Slot::Primary => state.primary.clone(),
            Slot::Secondary => state.secondary.clone(),
        }
    }

    /// Store `identity` in `slot`, replacing any previous value.
    pub fn set_identity(&self, slot: Slot, identity: Identity) {
        let mut state = self.inner.write();
        match slot {
            Slot::Primary => state.primary = Some(identity),
            Slot::Secondary => state.secondary = Some(identity),
        }
    }

    pub fn primary_token_acquired(&self) -> bool {
        self.inner.read().primary_token_acquired
    }

    /// Record that a token has been handed out.
    ///
    /// Monotonic: once set, the flag stays set for the process lifetime,
    /// which is what keeps slot selection on the secondary slot afterwards.
    pub fn mark_token_acquired(&self) {
        self.inner.write().primary_token_acquired = true;
    }
}
