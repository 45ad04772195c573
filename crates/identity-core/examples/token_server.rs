//! Runnable identity/token backend
//!
//! Serves the two user endpoints on the configured bind address. With
//! `VCALL_CONNECTION` set, identities come from the hosted provider;
//! without it, a process-local provider is used so the demo runs offline.
//!
//! ```bash
//! VCALL_ENABLE_MULTIPLE_USERS=true cargo run -p vcall-identity-core --example token_server
//! ```

use std::sync::Arc;

use tracing::info;
use vcall_identity_core::provider::{HttpIdentityProvider, IdentityProvider, LocalProvider};
use vcall_identity_core::{IdentityConfig, IdentityService, ProviderConnection, api};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = IdentityConfig::from_env()?;
    let provider: Arc<dyn IdentityProvider> = if config.connection.is_empty() {
        info!("no provider connection configured, using local provider");
        Arc::new(LocalProvider::new())
    } else {
        let connection = ProviderConnection::parse(&config.connection)?;
        Arc::new(HttpIdentityProvider::new(connection)?)
    };
    let service = Arc::new(IdentityService::new(provider, config.enable_multiple_users));

    let listener = tokio::net::TcpListener::bind(&config.api_bind_address).await?;
    info!(
        addr = %listener.local_addr()?,
        multi_user = config.enable_multiple_users,
        "identity API listening"
    );

    api::serve(listener, service, shutdown_signal()).await?;
    info!("identity API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
