//! End-to-end session behavior over the simulated calling backend.
//!
//! Each test wires two or three controllers onto one `SimNetwork` and
//! drives real calls between them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tokio_test::assert_ok;

use vcall_client_core::capability::sim::{SimNetwork, SimOptions, SimSurface};
use vcall_client_core::{
    AuthStorage, CachedCredentials, CallClientConfig, CallClientError, CallClientResult,
    CallPhase, CallSessionController, CredentialSource, MemoryAuthStorage, SessionEvent,
    StaticCredentialSource,
};

const WAIT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

struct Peer {
    session: Arc<CallSessionController>,
    surface: Arc<SimSurface>,
    storage: Arc<MemoryAuthStorage>,
}

async fn peer(network: &Arc<SimNetwork>, name: &str) -> Peer {
    peer_with(network, name, SimOptions::default()).await
}

async fn peer_with(network: &Arc<SimNetwork>, name: &str, options: SimOptions) -> Peer {
    init_tracing();
    let surface = SimSurface::new();
    let storage = Arc::new(MemoryAuthStorage::new());
    let session = CallSessionController::new(
        CallClientConfig::default().with_display_name(name),
        Arc::new(network.endpoint_with(name, options)),
        Arc::new(StaticCredentialSource::new(name, format!("tok-{name}"))),
        storage.clone(),
        surface.clone(),
    );
    session.connect().await.expect("connect should succeed");
    Peer {
        session,
        surface,
        storage,
    }
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let result = timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

async fn wait_for_phase(session: &CallSessionController, phase: CallPhase) {
    wait_until(&format!("phase {phase:?}"), || {
        session.snapshot().phase == phase
    })
    .await;
}

#[tokio::test]
async fn connect_populates_identity_and_caches_it() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;

    assert!(alice.session.is_connected());
    assert_eq!(alice.session.identity().as_deref(), Some("alice"));
    assert_eq!(
        alice.storage.load().expect("load"),
        Some(CachedCredentials {
            identity: "alice".to_string()
        })
    );

    let snapshot = alice.session.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Idle);
    assert!(snapshot.can_call);
}

#[tokio::test]
async fn connect_twice_is_an_error() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    assert!(alice.session.connect().await.is_err());
}

struct CountingCredentialSource {
    inner: StaticCredentialSource,
    identity_calls: AtomicUsize,
}

#[async_trait]
impl CredentialSource for CountingCredentialSource {
    async fn identity(&self) -> CallClientResult<String> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.identity().await
    }

    async fn token(&self) -> CallClientResult<String> {
        self.inner.token().await
    }
}

#[tokio::test]
async fn cached_identity_skips_the_fetch() {
    init_tracing();
    let network = SimNetwork::new();
    let storage = Arc::new(MemoryAuthStorage::new());
    storage
        .store(&CachedCredentials {
            identity: "cached-alice".to_string(),
        })
        .expect("store");

    let credentials = Arc::new(CountingCredentialSource {
        inner: StaticCredentialSource::new("fresh-alice", "tok-alice"),
        identity_calls: AtomicUsize::new(0),
    });
    let session = CallSessionController::new(
        CallClientConfig::default(),
        Arc::new(network.endpoint("alice")),
        credentials.clone(),
        storage,
        SimSurface::new(),
    );

    tokio_test::assert_ok!(session.connect().await);
    assert_eq!(session.identity().as_deref(), Some("cached-alice"));
    assert_eq!(credentials.identity_calls.load(Ordering::SeqCst), 0);
}

struct UnreadableStorage;

impl AuthStorage for UnreadableStorage {
    fn get_item(&self, _key: &str) -> CallClientResult<Option<String>> {
        Err(CallClientError::storage("backing store offline"))
    }

    fn set_item(&self, _key: &str, _value: &str) -> CallClientResult<()> {
        Err(CallClientError::storage("backing store offline"))
    }
}

#[tokio::test]
async fn broken_storage_does_not_block_connect() {
    init_tracing();
    let network = SimNetwork::new();
    let session = CallSessionController::new(
        CallClientConfig::default(),
        Arc::new(network.endpoint("alice")),
        Arc::new(StaticCredentialSource::new("alice", "tok-alice")),
        Arc::new(UnreadableStorage),
        SimSurface::new(),
    );

    tokio_test::assert_ok!(session.connect().await);
    assert_eq!(session.identity().as_deref(), Some("alice"));
}

struct PendingCredentialSource;

#[async_trait]
impl CredentialSource for PendingCredentialSource {
    async fn identity(&self) -> CallClientResult<String> {
        std::future::pending().await
    }

    async fn token(&self) -> CallClientResult<String> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn slow_credentials_hit_the_setup_timeout() {
    init_tracing();
    let network = SimNetwork::new();
    let session = CallSessionController::new(
        CallClientConfig::default().with_setup_timeout(Duration::from_millis(50)),
        Arc::new(network.endpoint("alice")),
        Arc::new(PendingCredentialSource),
        Arc::new(MemoryAuthStorage::new()),
        SimSurface::new(),
    );

    match session.connect().await {
        Err(CallClientError::Timeout { .. }) => {}
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert!(!session.is_connected());
}

#[tokio::test]
async fn operations_require_a_connected_session() {
    init_tracing();
    let network = SimNetwork::new();
    let session = CallSessionController::new(
        CallClientConfig::default(),
        Arc::new(network.endpoint("alice")),
        Arc::new(StaticCredentialSource::new("alice", "tok-alice")),
        Arc::new(MemoryAuthStorage::new()),
        SimSurface::new(),
    );

    match session.start_call("bob").await {
        Err(CallClientError::NotConnected { .. }) => {}
        other => panic!("expected not connected, got {other:?}"),
    }
}

#[tokio::test]
async fn outgoing_call_connects_and_renders_video() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    let snapshot = alice.session.start_call("bob").await.expect("start call");
    assert_eq!(snapshot.phase, CallPhase::OutgoingRinging);
    assert!(snapshot.outgoing);
    assert!(snapshot.call_id.is_some());
    assert_eq!(snapshot.counterpart.as_deref(), Some("bob"));

    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await;
    let ringing = bob.session.snapshot();
    assert!(ringing.incoming);
    assert!(ringing.can_accept);
    assert_eq!(ringing.counterpart.as_deref(), Some("alice"));

    bob.session.accept().await.expect("accept");
    wait_for_phase(&alice.session, CallPhase::Connected).await;
    wait_for_phase(&bob.session, CallPhase::Connected).await;

    wait_until("remote video on both surfaces", || {
        alice.surface.current().is_some() && bob.surface.current().is_some()
    })
    .await;

    let connected = alice.session.snapshot();
    assert!(connected.in_progress);
    assert!(connected.show_video);
    assert!(!connected.can_call);
}

#[tokio::test]
async fn missing_camera_fails_before_any_state_change() {
    let network = SimNetwork::new();
    let options = SimOptions {
        cameras: Vec::new(),
        ..SimOptions::default()
    };
    let alice = peer_with(&network, "alice", options).await;
    let _bob = peer(&network, "bob").await;

    match alice.session.start_call("bob").await {
        Err(CallClientError::DeviceNotFound { device }) => assert_eq!(device, "camera"),
        other => panic!("expected a missing camera, got {other:?}"),
    }
    assert_eq!(alice.session.snapshot().phase, CallPhase::Idle);
}

#[tokio::test]
async fn decline_returns_both_sides_to_rest() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    alice.session.start_call("bob").await.expect("start call");
    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await;

    let declined = bob.session.decline().await.expect("decline");
    assert_eq!(declined.phase, CallPhase::Idle);
    assert!(declined.can_call);

    wait_for_phase(&alice.session, CallPhase::Disconnected).await;
    assert!(alice.session.snapshot().can_call);
}

#[tokio::test]
async fn hang_up_disconnects_the_peer() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    alice.session.start_call("bob").await.expect("start call");
    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await;
    bob.session.accept().await.expect("accept");
    wait_for_phase(&alice.session, CallPhase::Connected).await;

    let ended = alice.session.hang_up().await.expect("hang up");
    assert_eq!(ended.phase, CallPhase::Idle);
    assert!(!ended.show_video);
    assert!(alice.surface.current().is_none());

    wait_for_phase(&bob.session, CallPhase::Disconnected).await;
    assert!(bob.surface.current().is_none());
}

#[tokio::test]
async fn decline_while_connected_hangs_up() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    alice.session.start_call("bob").await.expect("start call");
    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await;
    bob.session.accept().await.expect("accept");
    wait_for_phase(&bob.session, CallPhase::Connected).await;

    let ended = bob.session.decline().await.expect("decline");
    assert_eq!(ended.phase, CallPhase::Idle);
    wait_for_phase(&alice.session, CallPhase::Disconnected).await;
}

#[tokio::test]
async fn a_second_offer_replaces_the_first() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;
    let carol = peer(&network, "carol").await;

    alice.session.start_call("bob").await.expect("alice dials");
    wait_until("bob ringing from alice", || {
        let s = bob.session.snapshot();
        s.incoming && s.counterpart.as_deref() == Some("alice")
    })
    .await;

    carol.session.start_call("bob").await.expect("carol dials");
    wait_until("bob ringing from carol", || {
        let s = bob.session.snapshot();
        s.incoming && s.counterpart.as_deref() == Some("carol")
    })
    .await;

    // Alice's replaced offer got rejected under her.
    wait_for_phase(&alice.session, CallPhase::Disconnected).await;

    bob.session.accept().await.expect("accept carol");
    wait_for_phase(&bob.session, CallPhase::Connected).await;
    wait_for_phase(&carol.session, CallPhase::Connected).await;
    assert_eq!(
        bob.session.snapshot().counterpart.as_deref(),
        Some("carol")
    );
}

#[tokio::test]
async fn offers_while_connected_are_rejected() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;
    let carol = peer(&network, "carol").await;

    alice.session.start_call("bob").await.expect("start call");
    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await;
    bob.session.accept().await.expect("accept");
    wait_for_phase(&bob.session, CallPhase::Connected).await;

    carol.session.start_call("bob").await.expect("carol dials");
    wait_for_phase(&carol.session, CallPhase::Disconnected).await;

    let snapshot = bob.session.snapshot();
    assert!(snapshot.in_progress);
    assert_eq!(snapshot.counterpart.as_deref(), Some("alice"));
}

#[tokio::test]
async fn video_can_be_hidden_and_reshown() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    alice.session.start_call("bob").await.expect("start call");
    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await;
    bob.session.accept().await.expect("accept");
    wait_for_phase(&alice.session, CallPhase::Connected).await;
    wait_until("video rendered", || alice.surface.current().is_some()).await;

    let hidden = alice.session.hide_video().await.expect("hide");
    assert!(!hidden.show_video);
    assert!(alice.surface.current().is_none());

    let shown = alice.session.show_video().await.expect("show");
    assert!(shown.show_video);
    assert!(alice.surface.current().is_some());
}

#[tokio::test]
async fn show_video_fails_without_a_remote_stream() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let options = SimOptions {
        publish_video: false,
        ..SimOptions::default()
    };
    let bob = peer_with(&network, "bob", options).await;

    alice.session.start_call("bob").await.expect("start call");
    wait_for_phase(&bob.session, CallPhase::IncomingRinging).await;
    bob.session.accept().await.expect("accept");

    // The automatic render on connect fails and lowers the flag.
    wait_until("connected without video", || {
        let s = alice.session.snapshot();
        s.in_progress && !s.show_video
    })
    .await;
    assert!(alice.surface.current().is_none());

    match alice.session.show_video().await {
        Err(CallClientError::PreconditionUnmet { .. }) => {}
        other => panic!("expected a precondition error, got {other:?}"),
    }
    let snapshot = alice.session.snapshot();
    assert!(snapshot.in_progress, "the call survives the failed render");
    assert!(!snapshot.show_video);
}

#[tokio::test]
async fn idle_session_rejects_call_controls() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;

    assert!(alice.session.hang_up().await.is_err());
    assert!(alice.session.accept().await.is_err());
    assert!(alice.session.decline().await.is_err());
    assert!(alice.session.show_video().await.is_err());
}

#[tokio::test]
async fn incoming_offer_emits_events_in_order() {
    let network = SimNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    let mut events = bob.session.subscribe();
    alice.session.start_call("bob").await.expect("start call");

    let sequence = timeout(WAIT, async {
        let mut phase_change = None;
        loop {
            match events.recv().await.expect("event stream open") {
                SessionEvent::PhaseChanged { snapshot, cause } if phase_change.is_none() => {
                    phase_change = Some((snapshot, cause));
                }
                SessionEvent::IncomingCall { info } => {
                    return (phase_change, info);
                }
                _ => {}
            }
        }
    })
    .await
    .expect("events should arrive");

    let (phase_change, info) = sequence;
    let (snapshot, cause) = phase_change.expect("phase change precedes the offer event");
    assert_eq!(snapshot.phase, CallPhase::IncomingRinging);
    assert_eq!(cause, "inbound-offer");
    assert_eq!(info.caller, "alice");
}
