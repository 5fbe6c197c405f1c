//! Relay module: forwards queued camera frames over a loopback socket.
//!
//! This is the blocking half of the bridge. It owns the listener socket and
//! the poll/forward loop; lifecycle signals cross the thread boundary through
//! the readiness oneshot and the pipeline's stop handoff.

mod listener;
mod types;

pub use listener::{FrameRelay, ReadySignal};
pub use types::*;
