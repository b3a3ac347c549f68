use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use super::stats::SessionStatus;
use crate::audio::{
    ChunkCollector, SegmentFormat, StreamLease, VisualizationFeed, VisualizationTask,
};
use crate::error::CaptureError;

/// Fields fixed when the session leaves `Idle`
#[derive(Debug, Clone)]
pub(super) struct SessionInfo {
    pub device_id: String,
    pub title: Option<String>,
}

/// Everything that holds the device while recording
///
/// Dropping it releases the tracks, aborts the chunk collector and stops the
/// visualization loop.
pub(super) struct LiveCapture {
    pub lease: StreamLease,
    pub chunks: ChunkCollector,
    pub format: SegmentFormat,
    pub feed: VisualizationFeed,
    pub ticker: VisualizationTask,
}

/// Session lifecycle, one variant per state
///
/// `RequestingDevice`, `Stopping` and `Finalizing` are only observed while the
/// corresponding operation is suspended, or after it was dropped mid-flight
/// until `reset()`. The live resources for those phases are owned by the
/// running operation so that dropping it releases them.
pub(super) enum SessionState {
    Idle,
    RequestingDevice {
        info: SessionInfo,
    },
    Recording {
        info: SessionInfo,
        remote_session_id: String,
        started_at: DateTime<Utc>,
        clock: Instant,
        capture: LiveCapture,
    },
    Stopping {
        info: SessionInfo,
        remote_session_id: String,
        started_at: DateTime<Utc>,
        captured: Duration,
        /// Segments buffered when the stop was requested
        segments: usize,
    },
    Finalizing {
        info: SessionInfo,
        remote_session_id: String,
        started_at: DateTime<Utc>,
        captured: Duration,
        segments: usize,
    },
    Completed {
        info: SessionInfo,
        remote_session_id: String,
        started_at: DateTime<Utc>,
        captured: Duration,
        segments: usize,
        audio_path: Option<String>,
    },
    Error {
        info: Option<SessionInfo>,
        remote_session_id: Option<String>,
        error: CaptureError,
    },
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::RequestingDevice { .. } => SessionStatus::RequestingDevice,
            SessionState::Recording { .. } => SessionStatus::Recording,
            SessionState::Stopping { .. } => SessionStatus::Stopping,
            SessionState::Finalizing { .. } => SessionStatus::Finalizing,
            SessionState::Completed { .. } => SessionStatus::Completed,
            SessionState::Error { .. } => SessionStatus::Error,
        }
    }

    pub fn info(&self) -> Option<&SessionInfo> {
        match self {
            SessionState::Idle => None,
            SessionState::RequestingDevice { info }
            | SessionState::Recording { info, .. }
            | SessionState::Stopping { info, .. }
            | SessionState::Finalizing { info, .. }
            | SessionState::Completed { info, .. } => Some(info),
            SessionState::Error { info, .. } => info.as_ref(),
        }
    }

    pub fn remote_session_id(&self) -> Option<&str> {
        match self {
            SessionState::Recording {
                remote_session_id, ..
            }
            | SessionState::Stopping {
                remote_session_id, ..
            }
            | SessionState::Finalizing {
                remote_session_id, ..
            }
            | SessionState::Completed {
                remote_session_id, ..
            } => Some(remote_session_id),
            SessionState::Error {
                remote_session_id, ..
            } => remote_session_id.as_deref(),
            SessionState::Idle | SessionState::RequestingDevice { .. } => None,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Recording { started_at, .. }
            | SessionState::Stopping { started_at, .. }
            | SessionState::Finalizing { started_at, .. }
            | SessionState::Completed { started_at, .. } => Some(*started_at),
            _ => None,
        }
    }
}
