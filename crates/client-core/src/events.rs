//! Session events and the adapter from raw agent states
//!
//! Calling backends report a wide lifecycle ([`AgentCallState`]); the session
//! only distinguishes the three outcomes that move its state machine
//! ([`CallLifecycleEvent`]). The mapping lives here, at the boundary, so the
//! machine itself never sees backend-specific states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::call::{CallId, SessionSnapshot};

/// Call state as reported by a calling backend.
///
/// Superset of what the session cares about; hold and early-media states
/// exist so simulators and adapters can report them without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentCallState {
    None,
    Connecting,
    Ringing,
    EarlyMedia,
    Connected,
    LocalHold,
    RemoteHold,
    Disconnecting,
    Disconnected,
}

/// Lifecycle milestones the session machine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallLifecycleEvent {
    /// Far side is being alerted
    Ringing,
    /// Media is flowing
    Connected,
    /// Call is over, whoever ended it
    Disconnected,
}

impl CallLifecycleEvent {
    /// Map a raw agent state to a session milestone.
    ///
    /// Returns `None` for states that do not move the session: transient
    /// signaling states and the hold states, which keep the call connected.
    pub fn from_agent_state(state: AgentCallState) -> Option<Self> {
        match state {
            AgentCallState::Ringing | AgentCallState::EarlyMedia => Some(Self::Ringing),
            AgentCallState::Connected => Some(Self::Connected),
            AgentCallState::Disconnected => Some(Self::Disconnected),
            AgentCallState::None
            | AgentCallState::Connecting
            | AgentCallState::LocalHold
            | AgentCallState::RemoteHold
            | AgentCallState::Disconnecting => None,
        }
    }
}

/// Details of an inbound offer, surfaced while it rings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCallInfo {
    pub call_id: CallId,
    /// Display name or identity of the caller.
    pub caller: String,
    pub received_at: DateTime<Utc>,
}

/// Events emitted by the call session controller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session state changed; `cause` names the input that moved it.
    PhaseChanged {
        snapshot: SessionSnapshot,
        cause: String,
    },
    /// An inbound offer started ringing.
    IncomingCall { info: IncomingCallInfo },
    /// Remote video became visible on the surface.
    VideoStarted { call_id: CallId },
    /// Remote video was taken off the surface.
    VideoStopped,
    /// A non-fatal side effect failed; the session state is unaffected.
    EffectFailed { message: String },
}

/// Broadcast fan-out for [`SessionEvent`]s.
///
/// Slow subscribers lag rather than block the session; a lagging receiver
/// observes `RecvError::Lagged` and can resynchronize from a snapshot.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// Send errors mean nobody is listening, which is fine.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream` for `while let` style consumers.
    pub fn subscribe_stream(&self) -> SessionEventStream {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Stream of session events for async iteration.
pub type SessionEventStream = BroadcastStream<SessionEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_media_counts_as_ringing() {
        assert_eq!(
            CallLifecycleEvent::from_agent_state(AgentCallState::EarlyMedia),
            Some(CallLifecycleEvent::Ringing)
        );
    }

    #[test]
    fn hold_states_do_not_move_the_session() {
        assert_eq!(
            CallLifecycleEvent::from_agent_state(AgentCallState::LocalHold),
            None
        );
        assert_eq!(
            CallLifecycleEvent::from_agent_state(AgentCallState::RemoteHold),
            None
        );
    }

    #[tokio::test]
    async fn emitter_delivers_to_subscribers() {
        let emitter = EventEmitter::default();
        let mut receiver = emitter.subscribe();

        emitter.emit(SessionEvent::VideoStopped);

        match receiver.recv().await {
            Ok(SessionEvent::VideoStopped) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let emitter = EventEmitter::default();
        emitter.emit(SessionEvent::VideoStopped);
    }
}
