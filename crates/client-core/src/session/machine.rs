//! Pure call session transitions
//!
//! [`transition`] maps the current [`CallSessionState`] and one
//! [`SessionInput`] to the next state plus the [`SideEffect`]s to run.
//! It performs no I/O and takes no locks, so every rule in the session is
//! checkable with plain assertions. User inputs that are not allowed in the
//! current phase return an error; backend inputs that no longer apply
//! (stale call ids, duplicate states) produce a no-op transition instead.

use crate::call::{CallDirection, CallId, CallPhase, CallSessionState};
use crate::error::{CallClientError, CallClientResult};
use crate::events::{CallLifecycleEvent, IncomingCallInfo};

/// One input to the session machine.
///
/// The first six come from the user; the rest are fed back by the
/// controller from backend outcomes.
#[derive(Debug, Clone)]
pub enum SessionInput {
    StartCall { target: String },
    Accept,
    Decline,
    HangUp,
    ShowVideo,
    HideVideo,
    /// An inbound offer started ringing.
    InboundOffer { info: IncomingCallInfo },
    /// Lifecycle report for a specific call.
    Lifecycle {
        call_id: CallId,
        event: CallLifecycleEvent,
    },
    /// The outgoing call was placed and has an id now.
    CallPlaced { call_id: CallId },
    /// Placing or answering failed; abandon the attempt.
    CallFailed,
    /// Remote video could not be rendered.
    VideoUnavailable,
}

impl SessionInput {
    /// Short label for logs and `PhaseChanged` causes.
    pub fn label(&self) -> &'static str {
        match self {
            SessionInput::StartCall { .. } => "start-call",
            SessionInput::Accept => "accept",
            SessionInput::Decline => "decline",
            SessionInput::HangUp => "hang-up",
            SessionInput::ShowVideo => "show-video",
            SessionInput::HideVideo => "hide-video",
            SessionInput::InboundOffer { .. } => "inbound-offer",
            SessionInput::Lifecycle { event, .. } => match event {
                CallLifecycleEvent::Ringing => "remote-ringing",
                CallLifecycleEvent::Connected => "remote-connected",
                CallLifecycleEvent::Disconnected => "remote-disconnected",
            },
            SessionInput::CallPlaced { .. } => "call-placed",
            SessionInput::CallFailed => "call-failed",
            SessionInput::VideoUnavailable => "video-unavailable",
        }
    }
}

/// Side effect ordered by a transition, executed by the controller after
/// the new state is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Place an outgoing call to `target`.
    PlaceCall { target: String },
    /// Answer the pending inbound offer.
    AcceptPending,
    /// Reject the pending inbound offer.
    RejectPending,
    /// Reject the offer carried by the current input without storing it.
    RejectOffer,
    /// Hang up the current call handle.
    HangUpCurrent,
    /// Render the remote participant's video onto the surface.
    RenderRemoteVideo,
    /// Take whatever is on the video surface down.
    ClearSurface,
    /// Drop the current call handle and stop watching its lifecycle.
    ReleaseCall,
    /// Surface the inbound offer to the application.
    NotifyIncoming { info: IncomingCallInfo },
}

/// Next state plus the effects that realize it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: CallSessionState,
    pub effects: Vec<SideEffect>,
}

impl Transition {
    fn new(next: CallSessionState, effects: Vec<SideEffect>) -> Self {
        Self { next, effects }
    }

    /// State and effects both untouched.
    fn unchanged(state: &CallSessionState) -> Self {
        Self {
            next: state.clone(),
            effects: Vec::new(),
        }
    }
}

/// Compute the transition for `input` in `state`.
pub fn transition(
    state: &CallSessionState,
    input: SessionInput,
) -> CallClientResult<Transition> {
    match input {
        SessionInput::StartCall { target } => start_call(state, target),
        SessionInput::Accept => accept(state),
        SessionInput::Decline => decline(state),
        SessionInput::HangUp => hang_up(state),
        SessionInput::ShowVideo => show_video(state),
        SessionInput::HideVideo => hide_video(state),
        SessionInput::InboundOffer { info } => inbound_offer(state, info),
        SessionInput::Lifecycle { call_id, event } => lifecycle(state, call_id, event),
        SessionInput::CallPlaced { call_id } => call_placed(state, call_id),
        SessionInput::CallFailed => call_failed(state),
        SessionInput::VideoUnavailable => video_unavailable(state),
    }
}

fn start_call(state: &CallSessionState, target: String) -> CallClientResult<Transition> {
    if !state.can_call() {
        return Err(CallClientError::precondition(format!(
            "cannot start a call while {:?}",
            state.phase
        )));
    }

    let mut effects = Vec::new();
    // Dialing out while an offer rings turns the offer down first.
    if state.phase == CallPhase::IncomingRinging {
        effects.push(SideEffect::RejectPending);
    }
    effects.push(SideEffect::PlaceCall {
        target: target.clone(),
    });

    let next = CallSessionState {
        phase: CallPhase::OutgoingRinging,
        call_id: None,
        direction: Some(CallDirection::Outgoing),
        counterpart: Some(target),
        show_video: false,
    };
    Ok(Transition::new(next, effects))
}

fn accept(state: &CallSessionState) -> CallClientResult<Transition> {
    if state.phase != CallPhase::IncomingRinging {
        return Err(CallClientError::precondition("no ringing call to accept"));
    }
    // Phase moves once the backend reports the call connected.
    Ok(Transition::new(
        state.clone(),
        vec![SideEffect::AcceptPending],
    ))
}

fn decline(state: &CallSessionState) -> CallClientResult<Transition> {
    match state.phase {
        CallPhase::IncomingRinging => Ok(Transition::new(
            CallSessionState::idle(),
            vec![SideEffect::RejectPending, SideEffect::ClearSurface],
        )),
        // Declining a live call is a hang-up.
        CallPhase::Connected => Ok(Transition::new(
            CallSessionState::idle(),
            vec![
                SideEffect::HangUpCurrent,
                SideEffect::ClearSurface,
                SideEffect::ReleaseCall,
            ],
        )),
        _ => Err(CallClientError::precondition("nothing to decline")),
    }
}

fn hang_up(state: &CallSessionState) -> CallClientResult<Transition> {
    if !state.can_hang_up() {
        return Err(CallClientError::precondition("no call to hang up"));
    }
    Ok(Transition::new(
        CallSessionState::idle(),
        vec![
            SideEffect::HangUpCurrent,
            SideEffect::ClearSurface,
            SideEffect::ReleaseCall,
        ],
    ))
}

fn show_video(state: &CallSessionState) -> CallClientResult<Transition> {
    if state.phase != CallPhase::Connected {
        return Err(CallClientError::precondition(
            "remote video requires a connected call",
        ));
    }
    if state.show_video {
        return Ok(Transition::unchanged(state));
    }
    let next = CallSessionState {
        show_video: true,
        ..state.clone()
    };
    Ok(Transition::new(next, vec![SideEffect::RenderRemoteVideo]))
}

fn hide_video(state: &CallSessionState) -> CallClientResult<Transition> {
    if !state.show_video {
        return Ok(Transition::unchanged(state));
    }
    let next = CallSessionState {
        show_video: false,
        ..state.clone()
    };
    Ok(Transition::new(next, vec![SideEffect::ClearSurface]))
}

fn inbound_offer(state: &CallSessionState, info: IncomingCallInfo) -> CallClientResult<Transition> {
    match state.phase {
        // A newer offer replaces one still ringing; the controller rejects
        // the replaced offer when it stores the new one.
        CallPhase::Idle | CallPhase::Disconnected | CallPhase::IncomingRinging => {
            let next = CallSessionState {
                phase: CallPhase::IncomingRinging,
                call_id: Some(info.call_id),
                direction: Some(CallDirection::Incoming),
                counterpart: Some(info.caller.clone()),
                show_video: false,
            };
            Ok(Transition::new(
                next,
                vec![SideEffect::NotifyIncoming { info }],
            ))
        }
        // Busy: already dialing or on a call.
        CallPhase::OutgoingRinging | CallPhase::Connected => Ok(Transition::new(
            state.clone(),
            vec![SideEffect::RejectOffer],
        )),
    }
}

fn lifecycle(
    state: &CallSessionState,
    call_id: CallId,
    event: CallLifecycleEvent,
) -> CallClientResult<Transition> {
    // Reports for a call this session no longer tracks are stale.
    if state.call_id != Some(call_id) {
        return Ok(Transition::unchanged(state));
    }

    match event {
        CallLifecycleEvent::Ringing => Ok(Transition::unchanged(state)),
        CallLifecycleEvent::Connected => match state.phase {
            CallPhase::OutgoingRinging | CallPhase::IncomingRinging => {
                let next = CallSessionState {
                    phase: CallPhase::Connected,
                    show_video: true,
                    ..state.clone()
                };
                Ok(Transition::new(next, vec![SideEffect::RenderRemoteVideo]))
            }
            _ => Ok(Transition::unchanged(state)),
        },
        CallLifecycleEvent::Disconnected => {
            if state.phase == CallPhase::Disconnected {
                return Ok(Transition::unchanged(state));
            }
            // Call id and counterpart stay visible until the next call.
            let next = CallSessionState {
                phase: CallPhase::Disconnected,
                show_video: false,
                ..state.clone()
            };
            Ok(Transition::new(
                next,
                vec![SideEffect::ClearSurface, SideEffect::ReleaseCall],
            ))
        }
    }
}

fn call_placed(state: &CallSessionState, call_id: CallId) -> CallClientResult<Transition> {
    // Binds only the attempt that is still waiting for its id. Anything
    // else means the session moved on while the call was being placed.
    if state.phase == CallPhase::OutgoingRinging && state.call_id.is_none() {
        let next = CallSessionState {
            call_id: Some(call_id),
            ..state.clone()
        };
        return Ok(Transition::new(next, Vec::new()));
    }
    Ok(Transition::unchanged(state))
}

fn call_failed(_state: &CallSessionState) -> CallClientResult<Transition> {
    Ok(Transition::new(
        CallSessionState::idle(),
        vec![SideEffect::ClearSurface, SideEffect::ReleaseCall],
    ))
}

fn video_unavailable(state: &CallSessionState) -> CallClientResult<Transition> {
    let next = CallSessionState {
        show_video: false,
        ..state.clone()
    };
    Ok(Transition::new(next, Vec::new()))
}
