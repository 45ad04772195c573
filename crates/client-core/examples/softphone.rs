//! Two softphones on one simulated network, credentialed by an in-process
//! identity backend running in multi-user mode.
//!
//! Alice fetches the primary identity and connects; her token fetch flips
//! the backend to the secondary slot, so Bob comes up as a distinct user.
//! Alice then dials Bob, Bob accepts, video flows both ways, and Alice
//! hangs up.
//!
//! ```bash
//! cargo run -p vcall-client-core --example softphone
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use vcall_client_core::capability::sim::{SimNetwork, SimSurface};
use vcall_client_core::{
    CallClientConfig, CallClientError, CallClientResult, CallPhase, CallSessionController,
    CredentialSource, MemoryAuthStorage, SessionEvent,
};
use vcall_identity_core::{IdentityApiClient, IdentityService, LocalProvider, api};

/// Credentials fetched from the identity backend over HTTP.
struct BackendCredentials {
    api: IdentityApiClient,
    identity: String,
}

#[async_trait]
impl CredentialSource for BackendCredentials {
    async fn identity(&self) -> CallClientResult<String> {
        Ok(self.identity.clone())
    }

    async fn token(&self) -> CallClientResult<String> {
        self.api
            .token()
            .await
            .map_err(|err| CallClientError::upstream(err.to_string()))
    }
}

struct Softphone {
    session: Arc<CallSessionController>,
    surface: Arc<SimSurface>,
}

fn softphone(
    name: &str,
    network: &Arc<SimNetwork>,
    api: &IdentityApiClient,
    identity: &str,
) -> Softphone {
    let surface = SimSurface::new();
    let session = CallSessionController::new(
        CallClientConfig::default().with_display_name(name),
        Arc::new(network.endpoint(identity)),
        Arc::new(BackendCredentials {
            api: api.clone(),
            identity: identity.to_string(),
        }),
        Arc::new(MemoryAuthStorage::new()),
        surface.clone(),
    );
    Softphone { session, surface }
}

/// Print every session event under the phone's name.
fn watch(name: &'static str, phone: &Softphone) {
    let mut events = phone.session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::PhaseChanged { snapshot, cause } => {
                    info!(who = name, phase = ?snapshot.phase, cause, "phase changed");
                }
                SessionEvent::IncomingCall { info } => {
                    info!(who = name, caller = %info.caller, "incoming call");
                }
                SessionEvent::VideoStarted { .. } => info!(who = name, "remote video started"),
                SessionEvent::VideoStopped => info!(who = name, "remote video stopped"),
                SessionEvent::EffectFailed { message } => {
                    warn!(who = name, message, "effect failed");
                }
            }
        }
    });
}

async fn wait_for_phase(session: &CallSessionController, phase: CallPhase) -> anyhow::Result<()> {
    timeout(Duration::from_secs(5), async {
        while session.snapshot().phase != phase {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting for {phase:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .init();

    // Identity backend with multi-user mode on.
    let service = Arc::new(IdentityService::new(Arc::new(LocalProvider::new()), true));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(api::serve(listener, service, std::future::pending()));
    info!(%addr, "identity backend listening");

    let api_client = IdentityApiClient::new(format!("http://{addr}"));
    let network = SimNetwork::new();

    // Alice claims the primary slot. Her connect fetches a token, which
    // moves the backend's slot selection to the secondary user.
    let alice_id = api_client.identity().await?;
    let alice = softphone("alice", &network, &api_client, &alice_id);
    watch("alice", &alice);
    alice.session.connect().await?;

    let bob_id = api_client.identity().await?;
    anyhow::ensure!(
        alice_id != bob_id,
        "multi-user mode should mint a second identity"
    );
    let bob = softphone("bob", &network, &api_client, &bob_id);
    watch("bob", &bob);
    bob.session.connect().await?;

    info!(caller = %alice_id, callee = %bob_id, "dialing");
    alice.session.start_call(&bob_id).await?;
    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await?;

    bob.session.accept().await?;
    wait_for_phase(&alice.session, CallPhase::Connected).await?;
    wait_for_phase(&bob.session, CallPhase::Connected).await?;
    info!(
        alice_view = ?alice.surface.current().map(|v| v.content),
        bob_view = ?bob.surface.current().map(|v| v.content),
        "call connected with video"
    );

    sleep(Duration::from_millis(300)).await;

    alice.session.hide_video().await?;
    info!(
        showing = alice.surface.current().is_some(),
        "alice hid remote video"
    );
    alice.session.show_video().await?;

    alice.session.hang_up().await?;
    wait_for_phase(&bob.session, CallPhase::Disconnected).await?;
    info!(
        alice = ?alice.session.snapshot().phase,
        bob = ?bob.session.snapshot().phase,
        "call finished"
    );
    Ok(())
}
