//! Transcoder subprocess management.
//!
//! Builds the ffmpeg invocation that reads from the relay's loopback
//! endpoint and republishes over RTSP, and manages its lifecycle.

pub mod command;
pub mod manager;

pub use command::TranscodeCommand;
pub use manager::{TranscodeError, TranscodeManager};
