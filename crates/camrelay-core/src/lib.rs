//! Camrelay Core Library
//!
//! Shared functionality for camrelay components:
//! - Frame queue and camera stream descriptor
//! - Configuration resolution and hierarchy
//! - Tracing/logging initialization
//! - Common error types

pub mod config;
pub mod error;
pub mod frame;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use frame::{CameraStream, FrameQueue};
