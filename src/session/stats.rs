use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    RequestingDevice,
    Recording,
    Stopping,
    Finalizing,
    Completed,
    Error,
}

/// Snapshot of a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub status: SessionStatus,

    /// Device the session captures from
    pub device_id: Option<String>,

    pub title: Option<String>,

    /// Handle returned by the server on start
    pub remote_session_id: Option<String>,

    /// When local capture went live
    pub started_at: Option<DateTime<Utc>>,

    /// Captured time in seconds (advances only while recording)
    pub elapsed_secs: f64,

    /// Segments buffered so far
    pub segments_captured: usize,

    /// Failure that moved the session to `Error`
    pub last_error: Option<String>,
}
