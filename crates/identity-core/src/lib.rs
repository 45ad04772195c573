//! # vcall-identity-core
//!
//! Identity and calling-token issuance backend for vcall.
//!
//! This crate provides:
//! - Lazily created user identities backed by an external provider
//! - Fresh 24-hour voice/video tokens for those identities
//! - Primary/secondary slot selection for two-participant demos
//! - A small REST API exposing both operations
//!
//! ## Slot model
//!
//! The service keeps at most two identities in process memory. All requests
//! target the primary slot until a token has been issued; after that, with
//! `enable_multiple_users` set, requests target the secondary slot. The
//! selection is a pure function of those two flags (see [`types::Slot`]),
//! which is what lets a second browser tab come up as a distinct user.

pub mod api;
pub mod config;
pub mod error;
pub mod provider;
pub mod service;
pub mod store;
pub mod types;

#[cfg(feature = "client")]
pub mod client;

pub use config::{IdentityConfig, ProviderConnection};
pub use error::{IdentityError, Result};
pub use provider::{HttpIdentityProvider, IdentityProvider, LocalProvider};
pub use service::IdentityService;
pub use store::IdentityStore;
pub use types::{AccessToken, Identity, Slot, TokenScope};

#[cfg(feature = "client")]
pub use client::IdentityApiClient;

/// Initialize the identity service from configuration.
///
/// Parses the provider connection string and wires up the HTTP provider.
/// Use [`IdentityService::new`] directly to supply a different provider.
pub async fn init(config: IdentityConfig) -> Result<IdentityService> {
    let connection = ProviderConnection::parse(&config.connection)?;
    let provider = std::sync::Arc::new(HttpIdentityProvider::new(connection)?);
    Ok(IdentityService::new(provider, config.enable_multiple_users))
}
