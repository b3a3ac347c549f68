//! Remote recording resource
//!
//! The server keeps its own bookkeeping window for every capture:
//! - POST /api/meetings/start - open the window
//! - POST /api/meetings/stop - close it
//! - POST /api/meetings/upload - receive the encoded WAV with metadata
//! - GET /api/meetings/status - current server-side state

mod client;
mod messages;

pub use client::{HttpRemote, RemoteRecorder};
pub use messages::{
    ErrorDetail, RecordingStatus, StartReceipt, StartRequest, StartResponse, StopReceipt,
    StopResponse,
};
