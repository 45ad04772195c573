//! Process-local provider for demos and tests

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use super::IdentityProvider;
use crate::error::Result;
use crate::types::{AccessToken, Identity, TokenScope};

/// Record of one token handed out by [`LocalProvider`].
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub identity: Identity,
    pub scopes: Vec<TokenScope>,
    pub expires_on: DateTime<Utc>,
}

/// Provider that fabricates identities and tokens in process.
///
/// Tokens carry no signature and must never leave a development setup. The
/// issuance log lets tests assert which identity a token was bound to.
#[derive(Debug, Default)]
pub struct LocalProvider {
    next_seq: AtomicU64,
    issued: Mutex<Vec<IssuedToken>>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens handed out so far, oldest first.
    pub fn issued(&self) -> Vec<IssuedToken> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl IdentityProvider for LocalProvider {
    async fn create_identity(&self) -> Result<Identity> {
        Ok(Identity::new(format!("8:vcall:{}", Uuid::new_v4())))
    }

    async fn issue_token(
        &self,
        identity: &Identity,
        scopes: &[TokenScope],
        ttl: Duration,
    ) -> Result<AccessToken> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let expires_on = Utc::now() + ttl;
        self.issued.lock().push(IssuedToken {
            identity: identity.clone(),
            scopes: scopes.to_vec(),
            expires_on,
        });
        Ok(AccessToken {
            token: format!("tok-{seq}-{}", identity.as_str()),
            expires_on,
        })
    }
}
