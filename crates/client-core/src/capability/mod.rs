//! Calling capability abstraction
//!
//! The session controller drives a calling backend exclusively through the
//! traits in this module. They model the narrow slice of a calling SDK the
//! session needs: place and receive calls, watch their lifecycle, enumerate
//! cameras, and render remote video. Backends stay opaque; the in-memory
//! [`sim`] backend implements the same seam the real one would.

pub mod sim;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::call::CallId;
use crate::error::CallClientResult;
use crate::events::AgentCallState;

/// A camera known to the device manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionGrant {
    pub audio: bool,
    pub video: bool,
}

/// Media options for placing or accepting a call.
#[derive(Debug, Clone, Default)]
pub struct VideoOptions {
    /// Camera to publish from, if any.
    pub camera: Option<CameraInfo>,
}

impl VideoOptions {
    pub fn with_camera(camera: CameraInfo) -> Self {
        Self {
            camera: Some(camera),
        }
    }
}

/// Everything the controller holds onto after connecting.
pub struct CapabilityHandles {
    pub agent: Arc<dyn CallAgent>,
    pub devices: Arc<dyn DeviceManager>,
    pub renderer: Arc<dyn VideoRenderer>,
}

/// Entry point of a calling backend.
#[async_trait]
pub trait CallingCapability: Send + Sync {
    /// Authenticate against the backend and return live handles.
    async fn connect(&self, token: &str, display_name: &str)
        -> CallClientResult<CapabilityHandles>;
}

/// Receives inbound offers from the backend.
#[async_trait]
pub trait IncomingCallHandler: Send + Sync {
    async fn on_incoming_call(&self, call: Arc<dyn IncomingCall>);
}

/// Authenticated agent able to place calls and receive offers.
#[async_trait]
pub trait CallAgent: Send + Sync {
    /// Place an outgoing call.
    async fn start_call(
        &self,
        target: &str,
        options: VideoOptions,
    ) -> CallClientResult<Arc<dyn CallHandle>>;

    /// Install the handler for inbound offers, replacing any previous one.
    async fn set_incoming_handler(
        &self,
        handler: Arc<dyn IncomingCallHandler>,
    ) -> CallClientResult<()>;
}

/// An inbound offer that has not been answered yet.
#[async_trait]
pub trait IncomingCall: Send + Sync {
    fn id(&self) -> CallId;

    /// Display name or identity of the caller.
    fn caller(&self) -> String;

    /// Answer the offer; on success the returned call is connected.
    async fn accept(&self, options: VideoOptions) -> CallClientResult<Arc<dyn CallHandle>>;

    /// Turn the offer down without answering.
    async fn reject(&self) -> CallClientResult<()>;
}

/// A placed or answered call.
#[async_trait]
pub trait CallHandle: Send + Sync {
    fn id(&self) -> CallId;

    /// Current lifecycle state.
    ///
    /// Reading this after subscribing to [`CallHandle::state_updates`] gives
    /// a gap-free view: replay the current state first, then follow updates.
    fn state(&self) -> AgentCallState;

    /// Subscribe to lifecycle changes.
    fn state_updates(&self) -> broadcast::Receiver<AgentCallState>;

    /// Remote parties currently on the call.
    fn remote_participants(&self) -> Vec<Arc<dyn RemoteParticipant>>;

    /// End the call. `for_everyone` tears it down for all parties.
    async fn hang_up(&self, for_everyone: bool) -> CallClientResult<()>;
}

/// A remote party on a call.
pub trait RemoteParticipant: Send + Sync {
    fn id(&self) -> String;

    /// Video streams the participant is publishing.
    fn video_streams(&self) -> Vec<Arc<dyn RemoteVideoStream>>;
}

/// A single remote video stream.
pub trait RemoteVideoStream: Send + Sync {
    fn id(&self) -> String;
}

/// Renderable view of a remote stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererView {
    pub stream_id: String,
    /// Opaque content a surface can display.
    pub content: String,
}

/// Builds views from remote streams.
#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn create_view(&self, stream: Arc<dyn RemoteVideoStream>)
        -> CallClientResult<RendererView>;
}

/// Device enumeration and permission prompts.
#[async_trait]
pub trait DeviceManager: Send + Sync {
    /// Ask the user for device permissions.
    async fn ask_permission(&self, audio: bool, video: bool) -> CallClientResult<PermissionGrant>;

    /// Cameras available for publishing.
    async fn cameras(&self) -> CallClientResult<Vec<CameraInfo>>;
}

/// Where rendered remote video ends up, typically a DOM node or window.
pub trait VideoSurface: Send + Sync {
    fn attach(&self, view: RendererView);
    fn clear(&self);
}
