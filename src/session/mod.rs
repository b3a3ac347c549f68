//! Capture session management
//!
//! This module provides the `CaptureSession` state machine that:
//! - Owns the live input stream for the duration of one recording
//! - Buffers captured segments and feeds the level display
//! - Mirrors start/stop to the remote recording resource
//! - Decodes and encodes the capture into a WAV artifact on stop

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::{CaptureSession, StopOutcome};
pub use stats::{SessionStats, SessionStatus};
