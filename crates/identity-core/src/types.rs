//! Core identity and token types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque user handle issued by the external identity provider.
///
/// The backend never inspects the handle's structure; it is stored, compared
/// and handed back to callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access token bound to exactly one identity at mint time.
///
/// Tokens are not cached or refreshed; every request mints a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

/// Capability scopes a token can be minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Voip,
    Chat,
}

/// Logical selector determining which stored identity a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    /// Compute the slot a request targets.
    ///
    /// A pure function of the two inputs: the secondary slot is reachable
    /// only when multi-user mode is on AND a primary token has already been
    /// handed out. Identity creation alone never moves selection off the
    /// primary slot; token issuance does (see `IdentityService::get_token`).
    pub fn select(multi_enabled: bool, primary_token_acquired: bool) -> Slot {
        if multi_enabled && primary_token_acquired {
            Slot::Secondary
        } else {
            Slot::Primary
        }
    }
}
