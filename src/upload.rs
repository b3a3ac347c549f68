//! Upload handoff
//!
//! Holds the encoded recording until the server acknowledges it. A failed
//! attempt keeps the artifact so the caller can retry without recapturing.

use tracing::{info, warn};

use crate::audio::EncodedRecording;
use crate::error::{CaptureError, CaptureResult};
use crate::remote::RemoteRecorder;

pub struct UploadHandoff {
    recording: Option<EncodedRecording>,
    attempts: u32,
    last_error: Option<CaptureError>,
}

impl UploadHandoff {
    pub fn new(recording: EncodedRecording) -> Self {
        Self {
            recording: Some(recording),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        if let Some(recording) = &mut self.recording {
            recording.tags = tags;
        }
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        if let Some(recording) = &mut self.recording {
            recording.notes = notes;
        }
        self
    }

    /// Recording still awaiting acknowledgement
    pub fn pending(&self) -> Option<&EncodedRecording> {
        self.recording.as_ref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    pub fn is_delivered(&self) -> bool {
        self.recording.is_none()
    }

    /// Make one upload attempt
    ///
    /// Succeeds immediately if the recording was already delivered.
    pub async fn upload(&mut self, remote: &dyn RemoteRecorder) -> CaptureResult<()> {
        let Some(recording) = &self.recording else {
            return Ok(());
        };

        self.attempts += 1;
        info!(
            "Upload attempt {} ({} bytes)",
            self.attempts,
            recording.len()
        );

        let delivered = remote.upload(recording).await;
        match delivered {
            Ok(()) => {
                info!("Recording delivered after {} attempt(s)", self.attempts);
                self.recording = None;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                let error = CaptureError::UploadFailed(format!("{:#}", e));
                warn!("{}; recording kept for retry", error);
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }
}
