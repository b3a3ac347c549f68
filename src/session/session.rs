use super::config::SessionConfig;
use super::state::{LiveCapture, SessionInfo, SessionState};
use super::stats::{SessionStats, SessionStatus};
use crate::audio::{
    decode, encode, AudioDevice, ChunkCollector, DeviceRegistry, EncodedRecording, InputProvider,
    StreamLease, VisualizationFeed, VisualizationFrame, VisualizationTask,
};
use crate::error::{CaptureError, CaptureResult};
use crate::remote::RemoteRecorder;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Result of a successful `stop()`
#[derive(Debug, Clone)]
pub struct StopOutcome {
    /// The encoded capture, ready for upload
    pub recording: EncodedRecording,

    /// Server-side path reported by the remote stop
    pub audio_path: Option<String>,

    /// Set when the remote stop failed; the recording is still valid
    pub remote_error: Option<CaptureError>,
}

/// A live audio capture session mirrored to a remote recording resource
///
/// One session per client. The session owns the input stream exclusively from
/// `start()` until it leaves `Recording`; every exit path releases the device.
pub struct CaptureSession {
    provider: Arc<dyn InputProvider>,
    remote: Arc<dyn RemoteRecorder>,
    config: SessionConfig,
    devices: DeviceRegistry,
    state: SessionState,
}

impl CaptureSession {
    pub fn new(
        provider: Arc<dyn InputProvider>,
        remote: Arc<dyn RemoteRecorder>,
        config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            remote,
            config,
            devices: DeviceRegistry::new(),
            state: SessionState::Idle,
        }
    }

    /// Enumerate input devices (transient permission request)
    pub async fn list_devices(&mut self) -> CaptureResult<&[AudioDevice]> {
        self.devices.refresh(self.provider.as_ref()).await
    }

    /// Select the device the next `start()` will capture from
    pub fn select(&mut self, device_id: &str) -> CaptureResult<&AudioDevice> {
        self.devices.select(device_id)
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Failure that moved the session to `Error`
    pub fn last_error(&self) -> Option<&CaptureError> {
        match &self.state {
            SessionState::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Start capturing from the selected device
    ///
    /// Invalid session settings are rejected before any device is opened and
    /// leave the session `Idle`. The local stream goes live first; the remote
    /// start is only issued once chunk accumulation and visualization are
    /// running. If the server rejects the start, the stream is torn down before
    /// the error is returned.
    pub async fn start(&mut self, title: Option<String>) -> CaptureResult<()> {
        if !matches!(self.state, SessionState::Idle) {
            warn!("Start requested while session is {:?}", self.status());
            return Err(CaptureError::SessionActive);
        }

        self.config.validate()?;

        let device_id = self
            .devices
            .selected()
            .map(|d| d.id.clone())
            .ok_or(CaptureError::NoDeviceSelected)?;

        let info = SessionInfo {
            device_id: device_id.clone(),
            title,
        };

        info!(
            "Starting capture on {} (title: {:?})",
            device_id, info.title
        );
        self.state = SessionState::RequestingDevice { info: info.clone() };

        let opened = self.provider.open(Some(&device_id)).await;
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(Some(info), None, e)),
        };
        let mut lease = StreamLease::new(stream);

        let format = lease.stream().segment_format();
        let recorder = lease.stream_mut().start_recorder(self.config.flush_interval);
        let recorder_rx = match recorder {
            Ok(rx) => rx,
            Err(e) => return Err(self.fail(Some(info), None, e)),
        };

        let started_at = Utc::now();
        let clock = Instant::now();
        let tap = lease.stream().tap();
        let capture = LiveCapture {
            chunks: ChunkCollector::spawn(recorder_rx),
            feed: VisualizationFeed::new(tap.clone(), self.config.visualization_frame_len),
            ticker: VisualizationTask::spawn(
                tap,
                self.config.visualization_frame_len,
                self.config.visualization_interval,
            ),
            format,
            lease,
        };

        info!(
            "Local capture live on {} (flush every {:?})",
            device_id, self.config.flush_interval
        );

        let acknowledged = self.remote.start(info.title.as_deref()).await;
        let receipt = match acknowledged {
            Ok(receipt) => receipt,
            Err(e) => {
                drop(capture);
                let error = CaptureError::RemoteStartFailed(format!("{:#}", e));
                return Err(self.fail(Some(info), None, error));
            }
        };

        info!(
            "Recording {} on {}",
            receipt.remote_session_id, device_id
        );

        self.state = SessionState::Recording {
            info,
            remote_session_id: receipt.remote_session_id,
            started_at,
            clock,
            capture,
        };

        Ok(())
    }

    /// Stop capturing and produce the encoded recording
    ///
    /// Only valid while `Recording`; from any other state this fails with
    /// `NotRecording` and leaves the state untouched. A failed remote stop is
    /// reported in the outcome but does not discard the captured audio.
    pub async fn stop(&mut self) -> CaptureResult<StopOutcome> {
        let (info, remote_session_id, started_at, clock, capture) =
            match std::mem::replace(&mut self.state, SessionState::Idle) {
                SessionState::Recording {
                    info,
                    remote_session_id,
                    started_at,
                    clock,
                    capture,
                } => (info, remote_session_id, started_at, clock, capture),
                other => {
                    self.state = other;
                    return Err(CaptureError::NotRecording);
                }
            };

        let captured = clock.elapsed();
        let buffered = capture.chunks.segments_seen();
        let LiveCapture {
            mut lease,
            mut chunks,
            format,
            feed,
            ticker,
        } = capture;
        drop(ticker);
        drop(feed);

        info!(
            "Stopping capture {} after {:.1}s",
            remote_session_id,
            captured.as_secs_f64()
        );

        lease.stream_mut().stop_recorder();
        self.state = SessionState::Stopping {
            info: info.clone(),
            remote_session_id: remote_session_id.clone(),
            started_at,
            captured,
            segments: buffered,
        };

        let flushed = chunks.finish().await;
        drop(lease);

        let batch = match flushed {
            Ok(batch) => batch,
            Err(e) => return Err(self.fail(Some(info), Some(remote_session_id), e)),
        };
        let segments = batch.len();

        self.state = SessionState::Finalizing {
            info: info.clone(),
            remote_session_id: remote_session_id.clone(),
            started_at,
            captured,
            segments,
        };

        let stopped = self.remote.stop().await;
        let (audio_path, remote_error) = match stopped {
            Ok(receipt) => (Some(receipt.audio_path), None),
            Err(e) => {
                let error = CaptureError::RemoteStopFailed(format!("{:#}", e));
                warn!("{}; finalizing local capture anyway", error);
                (None, Some(error))
            }
        };

        let encoded = tokio::task::spawn_blocking(move || {
            let samples = decode(&batch, &format)?;
            encode(&samples)
        })
        .await
        .map_err(|e| CaptureError::EncodingFailed(format!("encoder task failed: {}", e)))
        .and_then(|result| result);

        let recording = match encoded {
            Ok(recording) => recording.with_title(info.title.clone()),
            Err(e) => {
                if let Some(remote) = &remote_error {
                    warn!("Remote stop had also failed: {}", remote);
                }
                return Err(self.fail(Some(info), Some(remote_session_id), e));
            }
        };

        match &remote_error {
            Some(error) => {
                self.fail(Some(info), Some(remote_session_id), error.clone());
            }
            None => {
                info!(
                    "Capture {} complete: {:.2}s, {} bytes",
                    remote_session_id,
                    recording.duration_seconds,
                    recording.len()
                );
                self.state = SessionState::Completed {
                    info,
                    remote_session_id,
                    started_at,
                    captured,
                    segments,
                    audio_path: audio_path.clone(),
                };
            }
        }

        Ok(StopOutcome {
            recording,
            audio_path,
            remote_error,
        })
    }

    /// Captured time, only while recording
    pub fn elapsed(&self) -> Option<Duration> {
        match &self.state {
            SessionState::Recording { clock, .. } => Some(clock.elapsed()),
            _ => None,
        }
    }

    /// Take one visualization snapshot; `None` unless recording
    pub fn visualization_frame(&mut self) -> Option<&VisualizationFrame> {
        match &mut self.state {
            SessionState::Recording { capture, .. } => Some(capture.feed.tick()),
            _ => None,
        }
    }

    /// Subscribe to the periodic visualization loop; `None` unless recording
    pub fn subscribe_visualization(&self) -> Option<watch::Receiver<VisualizationFrame>> {
        match &self.state {
            SessionState::Recording { capture, .. } => Some(capture.ticker.subscribe()),
            _ => None,
        }
    }

    /// Return to `Idle` from any state
    ///
    /// Releases the device, drops buffered audio and forgets the remote
    /// session. Never waits on the server.
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Idle);
        if !matches!(previous, SessionState::Idle) {
            info!("Resetting session from {:?}", previous.status());
        }
        drop(previous);
    }

    pub fn stats(&self) -> SessionStats {
        let info = self.state.info();

        let (elapsed_secs, segments_captured) = match &self.state {
            SessionState::Recording { clock, capture, .. } => {
                (clock.elapsed().as_secs_f64(), capture.chunks.segments_seen())
            }
            SessionState::Stopping {
                captured, segments, ..
            }
            | SessionState::Finalizing {
                captured, segments, ..
            }
            | SessionState::Completed {
                captured, segments, ..
            } => (captured.as_secs_f64(), *segments),
            _ => (0.0, 0),
        };

        SessionStats {
            status: self.status(),
            device_id: info.map(|i| i.device_id.clone()),
            title: info.and_then(|i| i.title.clone()),
            remote_session_id: self.state.remote_session_id().map(str::to_string),
            started_at: self.state.started_at(),
            elapsed_secs,
            segments_captured,
            last_error: self.last_error().map(ToString::to_string),
        }
    }

    fn fail(
        &mut self,
        info: Option<SessionInfo>,
        remote_session_id: Option<String>,
        error: CaptureError,
    ) -> CaptureError {
        error!("Capture session failed: {}", error);
        self.state = SessionState::Error {
            info,
            remote_session_id,
            error: error.clone(),
        };
        error
    }
}
