use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::visualize::DEFAULT_FRAME_LEN;
use crate::error::{CaptureError, CaptureResult};

/// Tunables for one capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recorder flush cadence
    /// Default: 1 second of captured audio per segment
    pub flush_interval: Duration,

    /// Period of the visualization sampling loop (~30fps)
    pub visualization_interval: Duration,

    /// Bytes per visualization frame
    pub visualization_frame_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(1000),
            visualization_interval: Duration::from_millis(33),
            visualization_frame_len: DEFAULT_FRAME_LEN,
        }
    }
}

impl SessionConfig {
    /// Reject settings the capture tasks cannot run with
    ///
    /// Both periods drive tokio intervals, which require a non-zero period.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.flush_interval.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "flush interval must be non-zero".to_string(),
            ));
        }
        if self.visualization_interval.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "visualization interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
