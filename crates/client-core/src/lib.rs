//! # vcall-client-core
//!
//! Call session engine for the vcall demo client. It drives a single-call
//! video session against an opaque calling backend: place and answer
//! calls, reject offers while busy, and render remote video on a surface.
//!
//! ```ascii
//!  user ops ──┐                         ┌─ CallingCapability (backend)
//!             v                         v
//!   CallSessionController ── machine::transition ── SideEffects
//!             │        (pure state + effects)           │
//!             └── SessionEvents ◄───────────────────────┘
//! ```
//!
//! All rules live in [`session::machine`], a pure function over
//! [`CallSessionState`]. The [`session::controller`] owns the live state,
//! serializes inputs from user calls, backend lifecycle reports, and
//! inbound offers, and executes the effects each transition orders.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vcall_client_core::{
//!     CallClientConfig, CallSessionController, MemoryAuthStorage, StaticCredentialSource,
//! };
//! use vcall_client_core::capability::sim::{SimNetwork, SimSurface};
//!
//! # async fn run() -> vcall_client_core::CallClientResult<()> {
//! let network = SimNetwork::new();
//! let session = CallSessionController::new(
//!     CallClientConfig::default().with_display_name("Alice"),
//!     Arc::new(network.endpoint("alice")),
//!     Arc::new(StaticCredentialSource::new("alice", "token")),
//!     Arc::new(MemoryAuthStorage::new()),
//!     SimSurface::new(),
//! );
//! session.connect().await?;
//! let snapshot = session.start_call("bob").await?;
//! assert!(snapshot.outgoing);
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod capability;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;

pub use call::{CallDirection, CallId, CallPhase, CallSessionState, SessionSnapshot};
pub use capability::{CallingCapability, CameraInfo, PermissionGrant, VideoOptions};
pub use config::CallClientConfig;
pub use credentials::{CredentialSource, StaticCredentialSource};
pub use error::{CallClientError, CallClientResult};
pub use events::{
    AgentCallState, CallLifecycleEvent, EventEmitter, IncomingCallInfo, SessionEvent,
    SessionEventStream,
};
pub use session::controller::CallSessionController;
pub use session::machine::{transition, SessionInput, SideEffect, Transition};
pub use storage::{AuthStorage, CachedCredentials, MemoryAuthStorage};

/// Version of the client core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
