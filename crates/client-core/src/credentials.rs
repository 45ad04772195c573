//! Where identities and access tokens come from
//!
//! The session never mints credentials itself; it asks a
//! [`CredentialSource`], typically backed by the identity service's HTTP
//! API.

use async_trait::async_trait;

use crate::error::CallClientResult;

/// Supplies the identity and token the session connects with.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Identity for this client, stable across calls to this method.
    async fn identity(&self) -> CallClientResult<String>;

    /// Fresh access token for the identity.
    async fn token(&self) -> CallClientResult<String>;
}

/// Fixed credentials for demos and tests.
pub struct StaticCredentialSource {
    identity: String,
    token: String,
}

impl StaticCredentialSource {
    pub fn new(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn identity(&self) -> CallClientResult<String> {
        Ok(self.identity.clone())
    }

    async fn token(&self) -> CallClientResult<String> {
        Ok(self.token.clone())
    }
}
