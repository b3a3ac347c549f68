// Shared test doubles for capture session tests
//
// ScriptedProvider hands out streams that replay a fixed list of recorder
// flushes; MockRemote records every call made against the server contract.

#![allow(dead_code)]

use anyhow::{bail, Result};
use meeting_recorder::audio::decode::raw_f32_bytes;
use meeting_recorder::audio::{
    AmplitudeTap, DeviceInfo, DeviceKind, InputProvider, InputStream, RecorderEvent,
    SegmentFormat,
};
use meeting_recorder::remote::{StartReceipt, StopReceipt};
use meeting_recorder::{CaptureError, CaptureResult, EncodedRecording, RemoteRecorder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Recorder output for one capture
#[derive(Clone)]
pub struct Script {
    pub sample_rate: u32,
    pub channels: u16,
    /// Segments flushed on ticks while recording (interleaved samples)
    pub ticks: Vec<Vec<f32>>,
    /// Segment flushed by the stop request
    pub last: Vec<f32>,
}

impl Script {
    /// `seconds` of a constant signal split into 1s ticks plus a partial tail
    pub fn steady(seconds: f64, sample_rate: u32, channels: u16, value: f32) -> Self {
        let total_frames = (seconds * f64::from(sample_rate)).round() as usize;
        let per_tick = sample_rate as usize;
        let samples_per_frame = usize::from(channels);

        let mut ticks = Vec::new();
        let mut remaining = total_frames;
        while remaining > per_tick {
            ticks.push(vec![value; per_tick * samples_per_frame]);
            remaining -= per_tick;
        }

        Self {
            sample_rate,
            channels,
            ticks,
            last: vec![value; remaining * samples_per_frame],
        }
    }
}

pub struct ScriptedProvider {
    devices: Vec<DeviceInfo>,
    script: Script,
    deny: AtomicBool,
    hold_final_flush: Arc<AtomicBool>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Self {
        let devices = vec![
            DeviceInfo {
                id: "default".to_string(),
                label: "Default microphone".to_string(),
                kind: DeviceKind::AudioInput,
                is_default: true,
            },
            DeviceInfo {
                id: "mic-1".to_string(),
                label: "USB microphone".to_string(),
                kind: DeviceKind::AudioInput,
                is_default: false,
            },
            DeviceInfo {
                id: "speakers".to_string(),
                label: "Speakers".to_string(),
                kind: DeviceKind::AudioOutput,
                is_default: true,
            },
        ];

        Self {
            devices,
            script,
            deny: AtomicBool::new(false),
            hold_final_flush: Arc::new(AtomicBool::new(false)),
            opens: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn deny_permission(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    /// Recorders ignore stop requests until this is cleared
    pub fn hold_final_flush(&self, hold: bool) {
        self.hold_final_flush.store(hold, Ordering::SeqCst);
    }

    /// Number of times device access was requested
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams currently holding a device
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn live_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }
}

#[async_trait::async_trait]
impl InputProvider for ScriptedProvider {
    async fn open(&self, device_id: Option<&str>) -> CaptureResult<Box<dyn InputStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.deny.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("user dismissed prompt".to_string()));
        }

        let device_id = device_id.unwrap_or("default").to_string();
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(CaptureError::Stream(format!("no such device {}", device_id)));
        }

        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedStream {
            device_id,
            script: self.script.clone(),
            tap: AmplitudeTap::new(4096),
            tx: None,
            hold_final_flush: Arc::clone(&self.hold_final_flush),
            live: Arc::clone(&self.live),
            is_live: true,
        }))
    }

    async fn enumerate(&self) -> CaptureResult<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedStream {
    device_id: String,
    script: Script,
    tap: AmplitudeTap,
    tx: Option<mpsc::Sender<RecorderEvent>>,
    hold_final_flush: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
    is_live: bool,
}

impl InputStream for ScriptedStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn segment_format(&self) -> SegmentFormat {
        SegmentFormat::RawF32 {
            sample_rate: self.script.sample_rate,
            channels: self.script.channels,
        }
    }

    fn start_recorder(&mut self, _timeslice: Duration) -> CaptureResult<mpsc::Receiver<RecorderEvent>> {
        let (tx, rx) = mpsc::channel(self.script.ticks.len() + 4);

        for tick in &self.script.ticks {
            self.tap.push(tick, self.script.channels);
            tx.try_send(RecorderEvent::Segment(raw_f32_bytes(tick)))
                .map_err(|e| CaptureError::Stream(e.to_string()))?;
        }

        self.tx = Some(tx);
        Ok(rx)
    }

    fn stop_recorder(&mut self) {
        if self.hold_final_flush.load(Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.tx.take() {
            self.tap.push(&self.script.last, self.script.channels);
            let _ = tx.try_send(RecorderEvent::Segment(raw_f32_bytes(&self.script.last)));
            let _ = tx.try_send(RecorderEvent::Stopped);
        }
    }

    fn tap(&self) -> AmplitudeTap {
        self.tap.clone()
    }

    fn release(&mut self) {
        if self.is_live {
            self.is_live = false;
            self.tx = None;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.is_live
    }
}

/// In-memory remote recording resource
#[derive(Default)]
pub struct MockRemote {
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    hang_start: AtomicBool,
    hang_stop: AtomicBool,
    upload_failures: AtomicUsize,
    calls: Mutex<Vec<String>>,
    uploads: Mutex<Vec<EncodedRecording>>,
    live_at_start: Mutex<Option<usize>>,
    live: Option<Arc<AtomicUsize>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the provider's live handle count when `start` arrives
    pub fn observing(live: Arc<AtomicUsize>) -> Self {
        Self {
            live: Some(live),
            ..Self::default()
        }
    }

    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    /// Leave `start` calls pending forever while set
    pub fn hang_start(&self, hang: bool) {
        self.hang_start.store(hang, Ordering::SeqCst);
    }

    /// Leave `stop` calls pending forever while set
    pub fn hang_stop(&self, hang: bool) {
        self.hang_stop.store(hang, Ordering::SeqCst);
    }

    /// Reject the next `count` uploads
    pub fn fail_uploads(&self, count: usize) {
        self.upload_failures.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<EncodedRecording> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn live_at_start(&self) -> Option<usize> {
        *self.live_at_start.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl RemoteRecorder for MockRemote {
    async fn start(&self, title: Option<&str>) -> Result<StartReceipt> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("start:{}", title.unwrap_or("")));

        if let Some(live) = &self.live {
            *self.live_at_start.lock().unwrap() = Some(live.load(Ordering::SeqCst));
        }

        if self.hang_start.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if self.fail_start.load(Ordering::SeqCst) {
            bail!("server returned 500: recorder busy");
        }

        Ok(StartReceipt {
            remote_session_id: "meeting-42".to_string(),
        })
    }

    async fn stop(&self) -> Result<StopReceipt> {
        self.calls.lock().unwrap().push("stop".to_string());

        if self.hang_stop.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if self.fail_stop.load(Ordering::SeqCst) {
            bail!("server returned 500: no active recording");
        }

        Ok(StopReceipt {
            audio_path: "recordings/meeting-42.wav".to_string(),
        })
    }

    async fn upload(&self, recording: &EncodedRecording) -> Result<()> {
        self.calls.lock().unwrap().push("upload".to_string());

        let pending_failures = self.upload_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.upload_failures.store(pending_failures - 1, Ordering::SeqCst);
            bail!("connection reset by peer");
        }

        self.uploads.lock().unwrap().push(recording.clone());
        Ok(())
    }
}
