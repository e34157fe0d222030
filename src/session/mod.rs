//! # Session State Machine
//!
//! ## State ([`state`])
//! The [`Session`] aggregate and its synchronous transitions: stage,
//! activity flag, verification slot, last error and generation counter.
//!
//! ## Controller ([`controller`])
//! The async orchestrator that validates triggers, calls the service client
//! without holding the session lock, and applies results if they are still
//! current.

pub mod controller;
pub mod state;

pub use controller::{Download, SessionController};
pub use state::{Activity, Applied, Session, Stage, Ticket};
