//! External identity provider abstraction
//!
//! Everything that touches the provider's wire format lives behind
//! [`IdentityProvider`]. [`HttpIdentityProvider`] speaks the REST surface of
//! a hosted communication service; [`LocalProvider`] fabricates handles in
//! process so demos and tests run offline.

use async_trait::async_trait;
use chrono::Duration;

use crate::error::Result;
use crate::types::{AccessToken, Identity, TokenScope};

mod http;
mod local;

pub use http::HttpIdentityProvider;
pub use local::{IssuedToken, LocalProvider};

/// Operations the backend needs from the external identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a fresh identity. Handles are opaque and never reused.
    async fn create_identity(&self) -> Result<Identity>;

    /// Mint a token for `identity`, limited to `scopes` and valid for `ttl`.
    async fn issue_token(
        &self,
        identity: &Identity,
        scopes: &[TokenScope],
        ttl: Duration,
    ) -> Result<AccessToken>;
}
