//! Call session state machine and its controller
//!
//! [`machine`] holds the pure transition function over
//! [`crate::call::CallSessionState`]; [`controller`] owns the live state,
//! feeds inputs through the machine, and runs the side effects it returns
//! against a calling backend.

pub mod controller;
pub mod machine;
