//! Live call session controller
//!
//! Owns one [`CallSessionState`], feeds every input through the pure
//! transition function, and runs the returned side effects against the
//! calling backend. The state lock is held only while a transition commits,
//! never across an await, so user calls, lifecycle reports, and inbound
//! offers can arrive concurrently and serialize here.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::call::{CallId, CallSessionState, SessionSnapshot};
use crate::capability::{
    CallAgent, CallHandle, CallingCapability, CameraInfo, DeviceManager, IncomingCall,
    IncomingCallHandler, VideoOptions, VideoRenderer, VideoSurface,
};
use crate::config::CallClientConfig;
use crate::credentials::CredentialSource;
use crate::error::{CallClientError, CallClientResult};
use crate::events::{
    AgentCallState, CallLifecycleEvent, EventEmitter, IncomingCallInfo, SessionEvent,
    SessionEventStream,
};
use crate::session::machine::{self, SessionInput, SideEffect};
use crate::storage::{AuthStorage, CachedCredentials};

/// Backend handles held after a successful [`CallSessionController::connect`].
struct Connected {
    agent: Arc<dyn CallAgent>,
    devices: Arc<dyn DeviceManager>,
    renderer: Arc<dyn VideoRenderer>,
}

/// Values an input carries into its side effects.
struct EffectCtx {
    camera: Option<CameraInfo>,
    offer: Option<Arc<dyn IncomingCall>>,
}

impl EffectCtx {
    fn none() -> Self {
        Self {
            camera: None,
            offer: None,
        }
    }

    fn with_camera(camera: CameraInfo) -> Self {
        Self {
            camera: Some(camera),
            offer: None,
        }
    }

    fn with_offer(offer: Arc<dyn IncomingCall>) -> Self {
        Self {
            camera: None,
            offer: Some(offer),
        }
    }
}

/// Controller for a single-call video session.
pub struct CallSessionController {
    config: CallClientConfig,
    capability: Arc<dyn CallingCapability>,
    credentials: Arc<dyn CredentialSource>,
    storage: Arc<dyn AuthStorage>,
    surface: Arc<dyn VideoSurface>,
    state: Mutex<CallSessionState>,
    connected: Mutex<Option<Connected>>,
    current_call: Mutex<Option<Arc<dyn CallHandle>>>,
    pending_incoming: Mutex<Option<Arc<dyn IncomingCall>>>,
    identity: Mutex<Option<String>>,
    emitter: EventEmitter,
}

impl CallSessionController {
    pub fn new(
        config: CallClientConfig,
        capability: Arc<dyn CallingCapability>,
        credentials: Arc<dyn CredentialSource>,
        storage: Arc<dyn AuthStorage>,
        surface: Arc<dyn VideoSurface>,
    ) -> Arc<Self> {
        let emitter = EventEmitter::new(config.event_buffer);
        Arc::new(Self {
            config,
            capability,
            credentials,
            storage,
            surface,
            state: Mutex::new(CallSessionState::idle()),
            connected: Mutex::new(None),
            current_call: Mutex::new(None),
            pending_incoming: Mutex::new(None),
            identity: Mutex::new(None),
            emitter,
        })
    }

    /// Resolve credentials, connect the calling backend, and prepare devices.
    ///
    /// Every step runs under the configured setup timeout. A cached identity
    /// is reused when the auth storage has one; a fresh token is fetched on
    /// every connect.
    pub async fn connect(self: &Arc<Self>) -> CallClientResult<()> {
        if self.is_connected() {
            return Err(CallClientError::precondition("session already connected"));
        }

        let identity = self.resolve_identity().await?;
        let token = self
            .step("fetch access token", self.credentials.token())
            .await?;

        let handles = self
            .step(
                "connect calling backend",
                self.capability.connect(&token, &self.config.display_name),
            )
            .await?;

        let handler = Arc::new(ControllerIncomingHandler {
            controller: Arc::downgrade(self),
        });
        self.step(
            "install incoming handler",
            handles.agent.set_incoming_handler(handler),
        )
        .await?;

        let grant = self
            .step(
                "request device permissions",
                handles.devices.ask_permission(true, true),
            )
            .await?;
        if !grant.audio || !grant.video {
            return Err(CallClientError::precondition(
                "audio and video permissions are required",
            ));
        }

        *self.identity.lock() = Some(identity.clone());
        *self.connected.lock() = Some(Connected {
            agent: handles.agent,
            devices: handles.devices,
            renderer: handles.renderer,
        });
        info!(identity = %identity, "call session connected");
        Ok(())
    }

    /// Place an outgoing call to `target`.
    pub async fn start_call(self: &Arc<Self>, target: &str) -> CallClientResult<SessionSnapshot> {
        self.ensure_connected()?;
        let target = target.trim();
        if target.is_empty() {
            return Err(CallClientError::precondition("call target is empty"));
        }
        let camera = self.default_camera().await?;
        self.apply(
            SessionInput::StartCall {
                target: target.to_string(),
            },
            EffectCtx::with_camera(camera),
        )
        .await
    }

    /// Answer the ringing inbound call.
    pub async fn accept(self: &Arc<Self>) -> CallClientResult<SessionSnapshot> {
        self.ensure_connected()?;
        let camera = self.default_camera().await?;
        self.apply(SessionInput::Accept, EffectCtx::with_camera(camera))
            .await
    }

    /// Turn down the ringing inbound call, or hang up a connected one.
    pub async fn decline(self: &Arc<Self>) -> CallClientResult<SessionSnapshot> {
        self.ensure_connected()?;
        self.apply(SessionInput::Decline, EffectCtx::none()).await
    }

    /// End the current call.
    pub async fn hang_up(self: &Arc<Self>) -> CallClientResult<SessionSnapshot> {
        self.ensure_connected()?;
        self.apply(SessionInput::HangUp, EffectCtx::none()).await
    }

    /// Render the remote participant's video onto the surface.
    pub async fn show_video(self: &Arc<Self>) -> CallClientResult<SessionSnapshot> {
        self.ensure_connected()?;
        self.apply(SessionInput::ShowVideo, EffectCtx::none()).await
    }

    /// Take remote video off the surface.
    pub async fn hide_video(self: &Arc<Self>) -> CallClientResult<SessionSnapshot> {
        self.ensure_connected()?;
        self.apply(SessionInput::HideVideo, EffectCtx::none()).await
    }

    /// Current session state with all derived flags.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.emitter.subscribe()
    }

    pub fn event_stream(&self) -> SessionEventStream {
        self.emitter.subscribe_stream()
    }

    /// Identity this session connected as, once connected.
    pub fn identity(&self) -> Option<String> {
        self.identity.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.lock().is_some()
    }

    async fn resolve_identity(&self) -> CallClientResult<String> {
        match self.storage.load() {
            Ok(Some(cached)) => {
                debug!(identity = %cached.identity, "using cached identity");
                return Ok(cached.identity);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "auth storage unreadable, fetching a fresh identity");
            }
        }

        let identity = self.step("fetch identity", self.credentials.identity()).await?;
        if let Err(err) = self.storage.store(&CachedCredentials {
            identity: identity.clone(),
        }) {
            warn!(error = %err, "failed to cache identity");
        }
        Ok(identity)
    }

    /// Run one setup step under the configured timeout.
    async fn step<T>(
        &self,
        name: &str,
        fut: impl Future<Output = CallClientResult<T>>,
    ) -> CallClientResult<T> {
        match tokio::time::timeout(self.config.setup_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let seconds = self.config.setup_timeout.as_secs();
                error!(step = name, seconds, "setup step timed out");
                Err(CallClientError::timeout(seconds))
            }
        }
    }

    fn ensure_connected(&self) -> CallClientResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(CallClientError::not_connected(
                "call session is not connected",
            ))
        }
    }

    fn agent(&self) -> CallClientResult<Arc<dyn CallAgent>> {
        self.connected
            .lock()
            .as_ref()
            .map(|c| c.agent.clone())
            .ok_or_else(|| CallClientError::not_connected("call session is not connected"))
    }

    fn renderer(&self) -> CallClientResult<Arc<dyn VideoRenderer>> {
        self.connected
            .lock()
            .as_ref()
            .map(|c| c.renderer.clone())
            .ok_or_else(|| CallClientError::not_connected("call session is not connected"))
    }

    /// First camera the device manager reports.
    async fn default_camera(&self) -> CallClientResult<CameraInfo> {
        let devices = self
            .connected
            .lock()
            .as_ref()
            .map(|c| c.devices.clone())
            .ok_or_else(|| CallClientError::not_connected("call session is not connected"))?;
        let cameras = devices.cameras().await?;
        cameras
            .into_iter()
            .next()
            .ok_or_else(|| CallClientError::device_not_found("camera"))
    }

    /// Commit `input` through the transition function, then run its effects.
    ///
    /// The returned snapshot is taken after the effects, so follow-up inputs
    /// they feed (placement ids, failures) are reflected in it.
    async fn apply(
        self: &Arc<Self>,
        input: SessionInput,
        ctx: EffectCtx,
    ) -> CallClientResult<SessionSnapshot> {
        let (effects, was_showing) = self.commit(input)?;
        self.run_effects(effects, ctx, was_showing).await?;
        Ok(self.snapshot())
    }

    /// Commit an input while holding the state lock and emit the phase
    /// change, keeping event order identical to commit order.
    fn commit(&self, input: SessionInput) -> CallClientResult<(Vec<SideEffect>, bool)> {
        let label = input.label();
        let mut state = self.state.lock();
        let transition = machine::transition(&state, input)?;
        let was_showing = state.show_video;
        let changed = transition.next != *state;
        *state = transition.next;
        if changed {
            debug!(cause = label, phase = ?state.phase, "session state changed");
            self.emitter.emit(SessionEvent::PhaseChanged {
                snapshot: state.snapshot(),
                cause: label.to_string(),
            });
        }
        Ok((transition.effects, was_showing))
    }

    /// Commit an internally generated input whose effects are all
    /// synchronous. Placement outcomes and render failures go through here,
    /// which keeps the async effect runner from recursing into itself.
    fn feed_simple(&self, input: SessionInput) -> CallClientResult<SessionSnapshot> {
        let (effects, was_showing) = self.commit(input)?;
        for effect in effects {
            match effect {
                SideEffect::ClearSurface => self.clear_surface(was_showing),
                SideEffect::ReleaseCall => self.release_call(),
                other => warn!(effect = ?other, "async effect on an internal input, skipped"),
            }
        }
        Ok(self.snapshot())
    }

    async fn run_effects(
        self: &Arc<Self>,
        effects: Vec<SideEffect>,
        ctx: EffectCtx,
        was_showing: bool,
    ) -> CallClientResult<()> {
        for effect in effects {
            match effect {
                SideEffect::PlaceCall { target } => {
                    self.place_call_effect(&target, ctx.camera.clone()).await?;
                }
                SideEffect::AcceptPending => {
                    self.accept_pending_effect(ctx.camera.clone()).await?;
                }
                SideEffect::RejectPending => self.reject_pending_effect().await,
                SideEffect::RejectOffer => self.reject_offer_effect(ctx.offer.clone()).await,
                SideEffect::HangUpCurrent => self.hang_up_current_effect().await,
                SideEffect::RenderRemoteVideo => self.render_remote_video_effect().await?,
                SideEffect::ClearSurface => self.clear_surface(was_showing),
                SideEffect::ReleaseCall => self.release_call(),
                SideEffect::NotifyIncoming { info } => {
                    self.notify_incoming_effect(info, ctx.offer.clone()).await;
                }
            }
        }
        Ok(())
    }

    /// Place the outgoing call and bind its id, unless the session moved on
    /// while placement was in flight.
    async fn place_call_effect(
        self: &Arc<Self>,
        target: &str,
        camera: Option<CameraInfo>,
    ) -> CallClientResult<()> {
        let agent = self.agent()?;
        let options = match camera {
            Some(camera) => VideoOptions::with_camera(camera),
            None => VideoOptions::default(),
        };

        let call = match agent.start_call(target, options).await {
            Ok(call) => call,
            Err(err) => {
                error!(callee = target, error = %err, "placing call failed");
                let _ = self.feed_simple(SessionInput::CallFailed);
                return Err(err);
            }
        };

        *self.current_call.lock() = Some(call.clone());
        let snapshot = self.feed_simple(SessionInput::CallPlaced { call_id: call.id() })?;
        if snapshot.call_id == Some(call.id()) {
            info!(call_id = %call.id(), callee = target, "outgoing call placed");
            self.spawn_lifecycle_pump(call);
        } else {
            // The user hung up before placement finished.
            warn!(call_id = %call.id(), "session abandoned the attempt, hanging up the orphan");
            {
                let mut current = self.current_call.lock();
                if current.as_ref().map(|c| c.id()) == Some(call.id()) {
                    current.take();
                }
            }
            if let Err(err) = call.hang_up(true).await {
                warn!(error = %err, "hanging up orphan call failed");
            }
        }
        Ok(())
    }

    /// Answer the stored offer; its call id is already bound in the state.
    async fn accept_pending_effect(
        self: &Arc<Self>,
        camera: Option<CameraInfo>,
    ) -> CallClientResult<()> {
        let offer = self.pending_incoming.lock().take();
        let Some(offer) = offer else {
            let _ = self.feed_simple(SessionInput::CallFailed);
            return Err(CallClientError::precondition(
                "ringing call is no longer available",
            ));
        };

        let options = match camera {
            Some(camera) => VideoOptions::with_camera(camera),
            None => VideoOptions::default(),
        };
        match offer.accept(options).await {
            Ok(call) => {
                info!(call_id = %call.id(), "inbound call accepted");
                *self.current_call.lock() = Some(call.clone());
                self.spawn_lifecycle_pump(call);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "accepting call failed");
                let _ = self.feed_simple(SessionInput::CallFailed);
                Err(err)
            }
        }
    }

    /// Reject the stored pending offer, if it is still there.
    async fn reject_pending_effect(&self) {
        let offer = self.pending_incoming.lock().take();
        match offer {
            Some(offer) => {
                if let Err(err) = offer.reject().await {
                    warn!(error = %err, "rejecting pending call failed");
                    self.emitter.emit(SessionEvent::EffectFailed {
                        message: format!("reject failed: {err}"),
                    });
                }
            }
            None => debug!("no pending offer to reject"),
        }
    }

    /// Reject an offer that never gets stored, the busy case.
    async fn reject_offer_effect(&self, offer: Option<Arc<dyn IncomingCall>>) {
        let Some(offer) = offer else {
            warn!("busy rejection without an offer to reject");
            return;
        };
        info!(call_id = %offer.id(), caller = %offer.caller(), "busy, rejecting offer");
        if let Err(err) = offer.reject().await {
            warn!(error = %err, "rejecting offer failed");
            self.emitter.emit(SessionEvent::EffectFailed {
                message: format!("reject failed: {err}"),
            });
        }
    }

    /// Hang up the call this session currently tracks.
    async fn hang_up_current_effect(&self) {
        let call = self.current_call.lock().clone();
        match call {
            Some(call) => {
                if let Err(err) = call.hang_up(true).await {
                    warn!(call_id = %call.id(), error = %err, "hang up failed");
                    self.emitter.emit(SessionEvent::EffectFailed {
                        message: format!("hang up failed: {err}"),
                    });
                }
            }
            None => debug!("no current call to hang up"),
        }
    }

    async fn render_remote_video_effect(self: &Arc<Self>) -> CallClientResult<()> {
        if let Err(err) = self.try_render_remote_video().await {
            warn!(error = %err, "remote video unavailable");
            let _ = self.feed_simple(SessionInput::VideoUnavailable);
            return Err(err);
        }
        Ok(())
    }

    async fn try_render_remote_video(&self) -> CallClientResult<()> {
        let call = self
            .current_call
            .lock()
            .clone()
            .ok_or_else(|| CallClientError::precondition("no active call to render"))?;
        let renderer = self.renderer()?;

        let participants = call.remote_participants();
        let participant = participants.first().ok_or_else(|| {
            CallClientError::precondition("remote participant has not joined yet")
        })?;
        let streams = participant.video_streams();
        let stream = streams.first().ok_or_else(|| {
            CallClientError::precondition("remote participant has no video stream")
        })?;

        let view = renderer.create_view(stream.clone()).await?;
        self.surface.attach(view);
        self.emitter.emit(SessionEvent::VideoStarted { call_id: call.id() });
        Ok(())
    }

    fn clear_surface(&self, was_showing: bool) {
        self.surface.clear();
        if was_showing {
            self.emitter.emit(SessionEvent::VideoStopped);
        }
    }

    fn release_call(&self) {
        if self.current_call.lock().take().is_some() {
            debug!("current call released");
        }
    }

    /// Store the new offer, reject the one it replaces, and notify.
    async fn notify_incoming_effect(&self, info: IncomingCallInfo, offer: Option<Arc<dyn IncomingCall>>) {
        let Some(offer) = offer else {
            warn!(call_id = %info.call_id, "offer notification without the offer itself");
            return;
        };
        let replaced = self.pending_incoming.lock().replace(offer);
        if let Some(replaced) = replaced {
            warn!(
                old = %replaced.id(),
                new = %info.call_id,
                "newer offer replaces one still ringing"
            );
            if let Err(err) = replaced.reject().await {
                warn!(error = %err, "rejecting replaced offer failed");
            }
        }
        self.emitter.emit(SessionEvent::IncomingCall { info });
    }

    async fn handle_incoming(self: &Arc<Self>, call: Arc<dyn IncomingCall>) {
        if !self.is_connected() {
            warn!(call_id = %call.id(), "offer before the session finished connecting, rejecting");
            if let Err(err) = call.reject().await {
                warn!(error = %err, "rejecting early offer failed");
            }
            return;
        }

        let info = IncomingCallInfo {
            call_id: call.id(),
            caller: call.caller(),
            received_at: Utc::now(),
        };
        info!(call_id = %info.call_id, caller = %info.caller, "incoming call");
        if let Err(err) = self
            .apply(SessionInput::InboundOffer { info }, EffectCtx::with_offer(call))
            .await
        {
            warn!(error = %err, "inbound offer handling failed");
        }
    }

    /// Watch one call's lifecycle and feed it into the machine.
    ///
    /// Subscribes before replaying the current state, so no transition can
    /// fall between the two; duplicates are no-ops in the machine. The pump
    /// holds no reference to the call handle while it waits.
    fn spawn_lifecycle_pump(self: &Arc<Self>, call: Arc<dyn CallHandle>) {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            let call_id = call.id();
            let mut updates = call.state_updates();
            let current = call.state();
            drop(call);

            debug!(%call_id, state = ?current, "lifecycle pump started");
            if Self::pump_state(&controller, call_id, current).await {
                return;
            }
            loop {
                match updates.recv().await {
                    Ok(state) => {
                        if Self::pump_state(&controller, call_id, state).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(%call_id, missed, "lifecycle updates lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(%call_id, "lifecycle pump finished");
        });
    }

    /// Feed one agent state into the session. Returns true when the pump
    /// should stop.
    async fn pump_state(
        controller: &Weak<Self>,
        call_id: CallId,
        state: AgentCallState,
    ) -> bool {
        let Some(controller) = controller.upgrade() else {
            return true;
        };
        let Some(event) = CallLifecycleEvent::from_agent_state(state) else {
            return false;
        };

        let input = SessionInput::Lifecycle { call_id, event };
        if let Err(err) = controller.apply(input, EffectCtx::none()).await {
            warn!(%call_id, error = %err, "lifecycle input failed");
            controller.emitter.emit(SessionEvent::EffectFailed {
                message: err.to_string(),
            });
        }
        event == CallLifecycleEvent::Disconnected
    }
}

/// Forwards backend offers into the session that installed it.
///
/// Holds the controller weakly: an offer that arrives after the session is
/// dropped finds a stale handler and is rejected instead of ringing nowhere.
struct ControllerIncomingHandler {
    controller: Weak<CallSessionController>,
}

#[async_trait]
impl IncomingCallHandler for ControllerIncomingHandler {
    async fn on_incoming_call(&self, call: Arc<dyn IncomingCall>) {
        match self.controller.upgrade() {
            Some(controller) => controller.handle_incoming(call).await,
            None => {
                warn!(call_id = %call.id(), "offer for a dropped session, rejecting");
                let _ = call.reject().await;
            }
        }
    }
}
