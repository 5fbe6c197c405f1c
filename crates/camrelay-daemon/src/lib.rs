//! Camrelay Daemon Library
//!
//! Core functionality for the camrelay daemon:
//! - Loopback TCP relay for camera frame forwarding
//! - Transcoder subprocess lifecycle management
//! - Stream pipeline orchestration across the thread boundary

pub mod pipeline;
pub mod relay;
pub mod transcode;
