//! Fetches an identity and a token from a running token_server
//!
//! ```bash
//! cargo run -p vcall-identity-core --example token_client --features client
//! ```

use vcall_identity_core::IdentityApiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let base_url =
        std::env::var("VCALL_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let client = IdentityApiClient::new(&base_url);

    let identity = client.identity().await?;
    println!("identity: {identity}");

    let token = client.token().await?;
    println!("token: {token}");

    // A second identity request shows slot behavior: same handle in
    // single-user mode, the secondary handle once multi-user is on.
    let identity_again = client.identity().await?;
    println!("identity after token: {identity_again}");

    Ok(())
}
