use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use super::visualize::AmplitudeTap;
use crate::error::CaptureResult;

/// Kind of media device reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Audio capture device (microphone, line-in)
    AudioInput,
    /// Audio playback device
    AudioOutput,
    /// Camera
    VideoInput,
}

/// Raw device record as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

/// Layout of the opaque segments emitted by a local recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentFormat {
    /// Interleaved little-endian `f32` PCM
    RawF32 { sample_rate: u32, channels: u16 },
    /// Containerized stream identified by MIME type (e.g. `audio/webm;codecs=opus`)
    Container { mime_type: String },
}

/// Output of the local recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// One flushed block of captured audio in the recorder's native format
    Segment(Vec<u8>),
    /// Final flush delivered; no further segments follow
    Stopped,
}

/// Live input stream handle
///
/// Owns the device tracks for one capture. The local recorder and the amplitude
/// tap both read from the same live graph.
pub trait InputStream: Send {
    /// Device the stream was opened on
    fn device_id(&self) -> &str;

    /// Format of the segments produced by `start_recorder`
    fn segment_format(&self) -> SegmentFormat;

    /// Start the local recorder
    ///
    /// Segments are flushed every `timeslice` of captured audio.
    fn start_recorder(&mut self, timeslice: Duration) -> CaptureResult<mpsc::Receiver<RecorderEvent>>;

    /// Ask the recorder to flush whatever it captured since the last tick and
    /// then emit `RecorderEvent::Stopped`.
    fn stop_recorder(&mut self);

    /// Time-domain amplitude tap fed by the live stream
    fn tap(&self) -> AmplitudeTap;

    /// Stop all tracks and release the device. Must be idempotent.
    fn release(&mut self);

    /// Whether any track still holds the device
    fn is_live(&self) -> bool;
}

/// Device permission collaborator
///
/// Implementations:
/// - File: every WAV file in a directory is an input device (CLI, batch runs)
/// - Test doubles: scripted segments for deterministic session tests
#[async_trait::async_trait]
pub trait InputProvider: Send + Sync {
    /// Request access to a device and open its input stream
    ///
    /// `None` opens whatever the platform considers the default input.
    async fn open(&self, device_id: Option<&str>) -> CaptureResult<Box<dyn InputStream>>;

    /// Enumerate all media devices
    async fn enumerate(&self) -> CaptureResult<Vec<DeviceInfo>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Scoped ownership of a live input stream
///
/// The device tracks are released when the lease is dropped, whichever path
/// the session takes out of `RequestingDevice` or `Recording`.
pub struct StreamLease {
    stream: Box<dyn InputStream>,
}

impl StreamLease {
    pub fn new(stream: Box<dyn InputStream>) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &dyn InputStream {
        &*self.stream
    }

    pub fn stream_mut(&mut self) -> &mut dyn InputStream {
        &mut *self.stream
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        if self.stream.is_live() {
            info!("Releasing input stream on device {}", self.stream.device_id());
        }
        self.stream.release();
    }
}
