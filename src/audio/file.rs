//! File-backed input devices
//!
//! Every `.wav` file in a directory is exposed as an input device. Opening one
//! plays it back in real time as if it were a live microphone: captured
//! samples feed the amplitude tap continuously and the recorder flushes raw
//! `f32` segments at the requested timeslice. Once a file runs out the device
//! keeps capturing silence.

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::backend::{
    DeviceInfo, DeviceKind, InputProvider, InputStream, RecorderEvent, SegmentFormat,
};
use super::decode::raw_f32_bytes;
use super::visualize::AmplitudeTap;
use crate::error::{CaptureError, CaptureResult};

/// How often captured audio is pushed to the amplitude tap
const CAPTURE_PERIOD: Duration = Duration::from_millis(20);

/// Samples kept for visualization (~1s at 48kHz)
const TAP_CAPACITY: usize = 48_000;

/// Device id treated as the platform default
pub const DEFAULT_DEVICE_ID: &str = "default";

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            (SampleFormat::Int, bits @ 8..=32) => {
                let scale = (1u64 << (bits - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
            (format, bits) => bail!("Unsupported WAV sample format: {:?} {}-bit", format, bits),
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

/// Input provider exposing the WAV files of one directory
pub struct FileInputProvider {
    dir: PathBuf,
}

impl FileInputProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn device_path(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", device_id))
    }

    fn scan(&self) -> std::io::Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_wav = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
            if !is_wav {
                continue;
            }

            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            devices.push(DeviceInfo {
                id: id.to_string(),
                label,
                kind: DeviceKind::AudioInput,
                is_default: id == DEFAULT_DEVICE_ID,
            });
        }

        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices)
    }
}

#[async_trait::async_trait]
impl InputProvider for FileInputProvider {
    async fn open(&self, device_id: Option<&str>) -> CaptureResult<Box<dyn InputStream>> {
        let devices = self
            .scan()
            .map_err(|e| CaptureError::PermissionDenied(format!("{}: {}", self.dir.display(), e)))?;

        let device = match device_id {
            Some(id) => devices.iter().find(|d| d.id == id),
            None => devices.iter().find(|d| d.is_default).or(devices.first()),
        }
        .ok_or_else(|| {
            CaptureError::Stream(format!(
                "input device {} is not available",
                device_id.unwrap_or(DEFAULT_DEVICE_ID)
            ))
        })?;

        let path = self.device_path(&device.id);
        let audio = AudioFile::open(&path)
            .map_err(|e| CaptureError::Stream(format!("{:#}", e)))?;

        info!(
            "Opened file input {} ({} Hz, {} channels)",
            device.id, audio.sample_rate, audio.channels
        );

        Ok(Box::new(FileInputStream::new(device.id.clone(), audio)))
    }

    async fn enumerate(&self) -> CaptureResult<Vec<DeviceInfo>> {
        self.scan()
            .map_err(|e| CaptureError::DeviceEnumeration(format!("{}: {}", self.dir.display(), e)))
    }

    fn name(&self) -> &str {
        "WAV file input"
    }
}

/// Real-time playback of one file as a live stream
pub struct FileInputStream {
    device_id: String,
    sample_rate: u32,
    channels: u16,
    samples: Arc<Vec<f32>>,
    tap: AmplitudeTap,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    live: bool,
}

impl FileInputStream {
    fn new(device_id: String, audio: AudioFile) -> Self {
        Self {
            device_id,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            samples: Arc::new(audio.samples),
            tap: AmplitudeTap::new(TAP_CAPACITY),
            stop_tx: None,
            task: None,
            live: true,
        }
    }
}

/// Read position over the file, producing silence past the end
struct Playhead {
    samples: Arc<Vec<f32>>,
    channels: usize,
    sample_rate: u32,
    started: Instant,
    captured_frames: usize,
}

impl Playhead {
    /// Frames captured since the last call, up to wall-clock now
    fn capture(&mut self) -> Vec<f32> {
        let target = (self.started.elapsed().as_secs_f64() * f64::from(self.sample_rate)) as usize;
        if target <= self.captured_frames {
            return Vec::new();
        }

        let start = self.captured_frames * self.channels;
        let end = target * self.channels;
        let mut block = vec![0.0; end - start];

        if start < self.samples.len() {
            let available = end.min(self.samples.len());
            block[..available - start].copy_from_slice(&self.samples[start..available]);
        }

        self.captured_frames = target;
        block
    }
}

impl InputStream for FileInputStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn segment_format(&self) -> SegmentFormat {
        SegmentFormat::RawF32 {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    fn start_recorder(&mut self, timeslice: Duration) -> CaptureResult<mpsc::Receiver<RecorderEvent>> {
        if !self.live {
            return Err(CaptureError::Stream("input stream already released".to_string()));
        }
        if self.task.is_some() {
            return Err(CaptureError::Stream("recorder already started".to_string()));
        }
        if timeslice.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "recorder timeslice must be non-zero".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let mut playhead = Playhead {
            samples: Arc::clone(&self.samples),
            channels: usize::from(self.channels.max(1)),
            sample_rate: self.sample_rate,
            started: Instant::now(),
            captured_frames: 0,
        };
        let tap = self.tap.clone();
        let channels = self.channels;
        let device_id = self.device_id.clone();

        let task = tokio::spawn(async move {
            let mut capture_tick = interval(CAPTURE_PERIOD);
            capture_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut flush_tick = interval(timeslice);
            flush_tick.tick().await;

            let mut pending: Vec<f32> = Vec::new();

            loop {
                tokio::select! {
                    _ = capture_tick.tick() => {
                        let block = playhead.capture();
                        tap.push(&block, channels);
                        pending.extend_from_slice(&block);
                    }
                    _ = flush_tick.tick() => {
                        let block = playhead.capture();
                        tap.push(&block, channels);
                        pending.extend_from_slice(&block);

                        let segment = raw_f32_bytes(&std::mem::take(&mut pending));
                        debug!("Recorder flush on {}: {} bytes", device_id, segment.len());
                        if tx.send(RecorderEvent::Segment(segment)).await.is_err() {
                            return;
                        }
                    }
                    _ = &mut stop_rx => {
                        pending.extend_from_slice(&playhead.capture());
                        let segment = raw_f32_bytes(&pending);
                        debug!("Final recorder flush on {}: {} bytes", device_id, segment.len());

                        if tx.send(RecorderEvent::Segment(segment)).await.is_ok() {
                            let _ = tx.send(RecorderEvent::Stopped).await;
                        }
                        return;
                    }
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);

        Ok(rx)
    }

    fn stop_recorder(&mut self) {
        match self.stop_tx.take() {
            Some(stop_tx) => {
                let _ = stop_tx.send(());
            }
            None => warn!("Stop requested on {} but the recorder is not running", self.device_id),
        }
    }

    fn tap(&self) -> AmplitudeTap {
        self.tap.clone()
    }

    fn release(&mut self) {
        if !self.live {
            return;
        }

        self.stop_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.tap.clear();
        self.live = false;

        info!("File input {} released", self.device_id);
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for FileInputStream {
    fn drop(&mut self) {
        self.release();
    }
}
