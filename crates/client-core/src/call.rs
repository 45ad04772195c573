//! Call session types and derived UI flags
//!
//! The session holds at most one call. Every flag a UI needs (`can_call`,
//! `can_hang_up`, `incoming`, ...) is derived from the lifecycle phase plus
//! the video sub-state, never stored separately, so the flags cannot drift
//! apart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a call
pub type CallId = Uuid;

/// Direction of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Call initiated by the remote party
    Incoming,
    /// Call initiated by us
    Outgoing,
}

/// Lifecycle phase of the call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallPhase {
    /// No call yet in this session
    Idle,
    /// Outgoing call placed, waiting for the far side
    OutgoingRinging,
    /// Inbound offer waiting for accept or decline
    IncomingRinging,
    /// Media flowing
    Connected,
    /// Previous call ended, ready for the next one
    Disconnected,
}

impl CallPhase {
    /// True in phases where starting a new outgoing call is allowed.
    ///
    /// An inbound offer does not block dialing; accepting is one of two
    /// choices the user has while it rings.
    pub fn can_call(&self) -> bool {
        matches!(
            self,
            CallPhase::Idle | CallPhase::Disconnected | CallPhase::IncomingRinging
        )
    }

    /// Logical complement of [`CallPhase::can_call`] in every phase.
    pub fn can_hang_up(&self) -> bool {
        !self.can_call()
    }
}

/// Complete state of the call session.
///
/// The transition function in [`crate::session::machine`] is the only
/// writer; everything else reads snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSessionState {
    pub phase: CallPhase,
    /// Call the current phase belongs to, once one exists.
    pub call_id: Option<CallId>,
    pub direction: Option<CallDirection>,
    /// Who we are talking to, or being called by.
    pub counterpart: Option<String>,
    /// Remote video currently rendered on the surface.
    pub show_video: bool,
}

impl CallSessionState {
    /// Fresh pre-call state.
    pub fn idle() -> Self {
        Self {
            phase: CallPhase::Idle,
            call_id: None,
            direction: None,
            counterpart: None,
            show_video: false,
        }
    }

    pub fn can_call(&self) -> bool {
        self.phase.can_call()
    }

    pub fn can_hang_up(&self) -> bool {
        self.phase.can_hang_up()
    }

    pub fn can_accept(&self) -> bool {
        self.phase == CallPhase::IncomingRinging
    }

    /// Decline rejects a ringing offer or, once connected, hangs up.
    pub fn can_decline(&self) -> bool {
        matches!(self.phase, CallPhase::IncomingRinging | CallPhase::Connected)
    }

    pub fn incoming(&self) -> bool {
        self.phase == CallPhase::IncomingRinging
    }

    pub fn outgoing(&self) -> bool {
        self.phase == CallPhase::OutgoingRinging
    }

    pub fn in_progress(&self) -> bool {
        self.phase == CallPhase::Connected
    }

    /// Expand every derived flag into a point-in-time view.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            call_id: self.call_id,
            direction: self.direction,
            counterpart: self.counterpart.clone(),
            can_call: self.can_call(),
            can_hang_up: self.can_hang_up(),
            can_accept: self.can_accept(),
            can_decline: self.can_decline(),
            incoming: self.incoming(),
            outgoing: self.outgoing(),
            in_progress: self.in_progress(),
            show_video: self.show_video,
        }
    }
}

impl Default for CallSessionState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Point-in-time view of the session with all derived flags expanded.
///
/// Serializable so UIs and logs can consume it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: CallPhase,
    pub call_id: Option<CallId>,
    pub direction: Option<CallDirection>,
    pub counterpart: Option<String>,
    pub can_call: bool,
    pub can_hang_up: bool,
    pub can_accept: bool,
    pub can_decline: bool,
    pub incoming: bool,
    pub outgoing: bool,
    pub in_progress: bool,
    pub show_video: bool,
}
