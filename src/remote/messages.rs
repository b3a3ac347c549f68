use serde::{Deserialize, Serialize};

/// Body of `POST /api/meetings/start`
#[derive(Debug, Serialize, Deserialize)]
pub struct StartRequest {
    pub title: Option<String>,
}

/// Reply to `POST /api/meetings/start`
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub meeting_id: Option<String>,
}

/// Reply to `POST /api/meetings/stop`
#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub audio_path: String,
}

/// Reply to `GET /api/meetings/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub status: String,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub meeting_id: Option<String>,
}

/// Server error body (`{"detail": "..."}`)
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Acknowledgement of a remote start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReceipt {
    pub remote_session_id: String,
}

/// Acknowledgement of a remote stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReceipt {
    pub audio_path: String,
}
