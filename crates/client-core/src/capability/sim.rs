//! In-memory calling backend
//!
//! A [`SimNetwork`] connects any number of endpoints by identity and routes
//! calls between them inside the process. Calls carry the same lifecycle a
//! real backend reports, so the session controller and its tests run
//! unchanged against it. Nothing here touches the network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    CallAgent, CallHandle, CallingCapability, CameraInfo, CapabilityHandles, DeviceManager,
    IncomingCall, IncomingCallHandler, PermissionGrant, RemoteParticipant, RemoteVideoStream,
    RendererView, VideoOptions, VideoRenderer, VideoSurface,
};
use crate::call::CallId;
use crate::error::{CallClientError, CallClientResult};
use crate::events::AgentCallState;

/// Behavior knobs for one simulated endpoint.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Cameras the device manager reports.
    pub cameras: Vec<CameraInfo>,
    /// Whether this endpoint publishes a video stream on its calls.
    pub publish_video: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            cameras: vec![CameraInfo {
                id: "cam-0".to_string(),
                name: "Simulated Camera".to_string(),
            }],
            publish_video: true,
        }
    }
}

/// Registry routing calls between simulated endpoints.
pub struct SimNetwork {
    agents: DashMap<String, Arc<SimAgent>>,
}

impl SimNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            agents: DashMap::new(),
        })
    }

    /// Endpoint with default options for `identity`.
    pub fn endpoint(self: &Arc<Self>, identity: &str) -> SimEndpoint {
        self.endpoint_with(identity, SimOptions::default())
    }

    /// Endpoint with custom cameras or publish behavior.
    pub fn endpoint_with(self: &Arc<Self>, identity: &str, options: SimOptions) -> SimEndpoint {
        SimEndpoint {
            network: Arc::downgrade(self),
            identity: identity.to_string(),
            options,
        }
    }
}

/// Connectable endpoint bound to one identity on a [`SimNetwork`].
pub struct SimEndpoint {
    network: Weak<SimNetwork>,
    identity: String,
    options: SimOptions,
}

#[async_trait]
impl CallingCapability for SimEndpoint {
    async fn connect(
        &self,
        token: &str,
        display_name: &str,
    ) -> CallClientResult<CapabilityHandles> {
        if token.trim().is_empty() {
            return Err(CallClientError::capability("access token is empty"));
        }
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| CallClientError::capability("simulated network is gone"))?;

        let agent = Arc::new(SimAgent {
            network: self.network.clone(),
            identity: self.identity.clone(),
            display_name: display_name.to_string(),
            options: self.options.clone(),
            handler: RwLock::new(None),
        });
        network.agents.insert(self.identity.clone(), agent.clone());
        debug!(identity = %self.identity, "simulated endpoint connected");

        Ok(CapabilityHandles {
            agent,
            devices: Arc::new(SimDeviceManager {
                cameras: self.options.cameras.clone(),
            }),
            renderer: Arc::new(SimRenderer),
        })
    }
}

struct SimAgent {
    network: Weak<SimNetwork>,
    identity: String,
    display_name: String,
    options: SimOptions,
    handler: RwLock<Option<Arc<dyn IncomingCallHandler>>>,
}

#[async_trait]
impl CallAgent for SimAgent {
    async fn start_call(
        &self,
        target: &str,
        options: VideoOptions,
    ) -> CallClientResult<Arc<dyn CallHandle>> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| CallClientError::capability("simulated network is gone"))?;
        let callee = network
            .agents
            .get(target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                CallClientError::capability(format!("no endpoint registered for {target}"))
            })?;

        let call_id = Uuid::new_v4();
        let publishes = options.camera.is_some() && self.options.publish_video;
        let caller_call = SimCall::new(call_id, publishes, AgentCallState::Ringing);

        let offer = Arc::new(SimIncomingCall {
            id: call_id,
            caller: self.display_name.clone(),
            caller_identity: self.identity.clone(),
            caller_call: caller_call.clone(),
            callee: callee.clone(),
            answered: AtomicBool::new(false),
        });

        // Delivered from a fresh task so a self-call cannot re-enter the
        // caller's locks while start_call is still on the stack.
        tokio::spawn(async move {
            let handler = offer.callee.handler.read().await.clone();
            match handler {
                Some(handler) => handler.on_incoming_call(offer.clone()).await,
                None => {
                    warn!(
                        callee = %offer.callee.identity,
                        "no incoming handler registered, dropping offer"
                    );
                    offer.caller_call.push_state(AgentCallState::Disconnected);
                }
            }
        });

        Ok(caller_call)
    }

    async fn set_incoming_handler(
        &self,
        handler: Arc<dyn IncomingCallHandler>,
    ) -> CallClientResult<()> {
        *self.handler.write().await = Some(handler);
        Ok(())
    }
}

struct SimIncomingCall {
    id: CallId,
    caller: String,
    caller_identity: String,
    caller_call: Arc<SimCall>,
    callee: Arc<SimAgent>,
    answered: AtomicBool,
}

impl SimIncomingCall {
    fn take_answer_slot(&self) -> CallClientResult<()> {
        if self.answered.swap(true, Ordering::SeqCst) {
            return Err(CallClientError::capability("offer already answered"));
        }
        Ok(())
    }
}

#[async_trait]
impl IncomingCall for SimIncomingCall {
    fn id(&self) -> CallId {
        self.id
    }

    fn caller(&self) -> String {
        self.caller.clone()
    }

    async fn accept(&self, options: VideoOptions) -> CallClientResult<Arc<dyn CallHandle>> {
        self.take_answer_slot()?;
        if self.caller_call.state() == AgentCallState::Disconnected {
            return Err(CallClientError::capability("call is no longer available"));
        }

        let callee_publishes = options.camera.is_some() && self.callee.options.publish_video;
        let callee_call = SimCall::new(self.id, callee_publishes, AgentCallState::Connected);

        callee_call.link(&self.caller_call);
        self.caller_call.link(&callee_call);
        self.caller_call
            .attach_participant(&self.callee.identity, callee_publishes);
        callee_call.attach_participant(&self.caller_identity, self.caller_call.publishes_video);

        self.caller_call.push_state(AgentCallState::Connected);
        debug!(call_id = %self.id, "offer accepted");

        Ok(callee_call)
    }

    async fn reject(&self) -> CallClientResult<()> {
        self.take_answer_slot()?;
        self.caller_call.push_state(AgentCallState::Disconnected);
        debug!(call_id = %self.id, "offer rejected");
        Ok(())
    }
}

/// One side of a simulated call.
struct SimCall {
    id: CallId,
    publishes_video: bool,
    state: Mutex<AgentCallState>,
    updates: broadcast::Sender<AgentCallState>,
    participants: Mutex<Vec<Arc<dyn RemoteParticipant>>>,
    peer: Mutex<Option<Weak<SimCall>>>,
}

impl SimCall {
    fn new(id: CallId, publishes_video: bool, initial: AgentCallState) -> Arc<Self> {
        let (updates, _) = broadcast::channel(64);
        Arc::new(Self {
            id,
            publishes_video,
            state: Mutex::new(initial),
            updates,
            participants: Mutex::new(Vec::new()),
            peer: Mutex::new(None),
        })
    }

    fn link(&self, peer: &Arc<SimCall>) {
        *self.peer.lock() = Some(Arc::downgrade(peer));
    }

    fn attach_participant(&self, identity: &str, publishes: bool) {
        let streams: Vec<Arc<dyn RemoteVideoStream>> = if publishes {
            vec![Arc::new(SimStream {
                id: format!("video-{identity}"),
            })]
        } else {
            Vec::new()
        };
        self.participants.lock().push(Arc::new(SimParticipant {
            identity: identity.to_string(),
            streams,
        }));
    }

    /// Record and broadcast a state change. Repeats of the current state
    /// are dropped.
    fn push_state(&self, next: AgentCallState) {
        {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            *state = next;
        }
        let _ = self.updates.send(next);
    }

    fn peer(&self) -> Option<Arc<SimCall>> {
        self.peer.lock().as_ref().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl CallHandle for SimCall {
    fn id(&self) -> CallId {
        self.id
    }

    fn state(&self) -> AgentCallState {
        *self.state.lock()
    }

    fn state_updates(&self) -> broadcast::Receiver<AgentCallState> {
        self.updates.subscribe()
    }

    fn remote_participants(&self) -> Vec<Arc<dyn RemoteParticipant>> {
        self.participants.lock().clone()
    }

    async fn hang_up(&self, for_everyone: bool) -> CallClientResult<()> {
        // Two-party calls end for both sides either way.
        let _ = for_everyone;
        self.push_state(AgentCallState::Disconnected);
        if let Some(peer) = self.peer() {
            peer.push_state(AgentCallState::Disconnected);
        }
        Ok(())
    }
}

struct SimParticipant {
    identity: String,
    streams: Vec<Arc<dyn RemoteVideoStream>>,
}

impl RemoteParticipant for SimParticipant {
    fn id(&self) -> String {
        self.identity.clone()
    }

    fn video_streams(&self) -> Vec<Arc<dyn RemoteVideoStream>> {
        self.streams.clone()
    }
}

struct SimStream {
    id: String,
}

impl RemoteVideoStream for SimStream {
    fn id(&self) -> String {
        self.id.clone()
    }
}

struct SimDeviceManager {
    cameras: Vec<CameraInfo>,
}

#[async_trait]
impl DeviceManager for SimDeviceManager {
    async fn ask_permission(&self, audio: bool, video: bool) -> CallClientResult<PermissionGrant> {
        Ok(PermissionGrant { audio, video })
    }

    async fn cameras(&self) -> CallClientResult<Vec<CameraInfo>> {
        Ok(self.cameras.clone())
    }
}

struct SimRenderer;

#[async_trait]
impl VideoRenderer for SimRenderer {
    async fn create_view(
        &self,
        stream: Arc<dyn RemoteVideoStream>,
    ) -> CallClientResult<RendererView> {
        let stream_id = stream.id();
        Ok(RendererView {
            content: format!("sim-view:{stream_id}"),
            stream_id,
        })
    }
}

/// Recording video surface for tests and demos.
#[derive(Default)]
pub struct SimSurface {
    current: Mutex<Option<RendererView>>,
    cleared: AtomicUsize,
}

impl SimSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// View currently attached, if any.
    pub fn current(&self) -> Option<RendererView> {
        self.current.lock().clone()
    }

    /// How many times the surface has been cleared.
    pub fn clear_count(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl VideoSurface for SimSurface {
    fn attach(&self, view: RendererView) {
        *self.current.lock() = Some(view);
    }

    fn clear(&self) {
        *self.current.lock() = None;
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct CaptureHandler {
        offers: mpsc::UnboundedSender<Arc<dyn IncomingCall>>,
    }

    #[async_trait]
    impl IncomingCallHandler for CaptureHandler {
        async fn on_incoming_call(&self, call: Arc<dyn IncomingCall>) {
            let _ = self.offers.send(call);
        }
    }

    async fn connected_pair(
        network: &Arc<SimNetwork>,
    ) -> (
        Arc<dyn CallAgent>,
        Arc<dyn CallAgent>,
        mpsc::UnboundedReceiver<Arc<dyn IncomingCall>>,
    ) {
        let alice = network
            .endpoint("alice")
            .connect("tok-a", "Alice")
            .await
            .unwrap();
        let bob = network
            .endpoint("bob")
            .connect("tok-b", "Bob")
            .await
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        bob.agent
            .set_incoming_handler(Arc::new(CaptureHandler { offers: tx }))
            .await
            .unwrap();
        (alice.agent, bob.agent, rx)
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let network = SimNetwork::new();
        let result = network.endpoint("alice").connect("  ", "Alice").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn offer_reaches_the_registered_handler() {
        let network = SimNetwork::new();
        let (alice, _bob, mut offers) = connected_pair(&network).await;

        let call = alice
            .start_call("bob", VideoOptions::default())
            .await
            .unwrap();
        let offer = offers.recv().await.unwrap();

        assert_eq!(offer.id(), call.id());
        assert_eq!(offer.caller(), "Alice");
        assert_eq!(call.state(), AgentCallState::Ringing);
    }

    #[tokio::test]
    async fn accept_connects_both_sides_and_exposes_video() {
        let network = SimNetwork::new();
        let (alice, _bob, mut offers) = connected_pair(&network).await;

        let camera = CameraInfo {
            id: "cam-0".to_string(),
            name: "Simulated Camera".to_string(),
        };
        let caller_call = alice
            .start_call("bob", VideoOptions::with_camera(camera.clone()))
            .await
            .unwrap();
        let offer = offers.recv().await.unwrap();
        let callee_call = offer.accept(VideoOptions::with_camera(camera)).await.unwrap();

        let mut updates = caller_call.state_updates();
        if caller_call.state() != AgentCallState::Connected {
            assert_eq!(updates.recv().await.unwrap(), AgentCallState::Connected);
        }
        assert_eq!(callee_call.state(), AgentCallState::Connected);

        let participants = caller_call.remote_participants();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].id(), "bob");
        assert_eq!(participants[0].video_streams().len(), 1);
    }

    #[tokio::test]
    async fn reject_disconnects_the_caller() {
        let network = SimNetwork::new();
        let (alice, _bob, mut offers) = connected_pair(&network).await;

        let caller_call = alice
            .start_call("bob", VideoOptions::default())
            .await
            .unwrap();
        let mut updates = caller_call.state_updates();
        let offer = offers.recv().await.unwrap();
        offer.reject().await.unwrap();

        assert_eq!(updates.recv().await.unwrap(), AgentCallState::Disconnected);
        assert!(offer.reject().await.is_err(), "second answer must fail");
    }

    #[tokio::test]
    async fn accept_fails_once_the_caller_hung_up() {
        let network = SimNetwork::new();
        let (alice, _bob, mut offers) = connected_pair(&network).await;

        let caller_call = alice
            .start_call("bob", VideoOptions::default())
            .await
            .unwrap();
        let offer = offers.recv().await.unwrap();
        caller_call.hang_up(true).await.unwrap();

        assert!(offer.accept(VideoOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn hang_up_ends_the_call_for_the_peer() {
        let network = SimNetwork::new();
        let (alice, _bob, mut offers) = connected_pair(&network).await;

        let caller_call = alice
            .start_call("bob", VideoOptions::default())
            .await
            .unwrap();
        let offer = offers.recv().await.unwrap();
        let callee_call = offer.accept(VideoOptions::default()).await.unwrap();

        let mut callee_updates = callee_call.state_updates();
        caller_call.hang_up(true).await.unwrap();

        assert_eq!(caller_call.state(), AgentCallState::Disconnected);
        assert_eq!(
            callee_updates.recv().await.unwrap(),
            AgentCallState::Disconnected
        );
    }

    #[tokio::test]
    async fn calling_an_unknown_identity_fails() {
        let network = SimNetwork::new();
        let alice = network
            .endpoint("alice")
            .connect("tok-a", "Alice")
            .await
            .unwrap();

        let result = alice.agent.start_call("nobody", VideoOptions::default()).await;
        assert!(result.is_err());
    }
}
