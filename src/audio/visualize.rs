//! Time-domain amplitude feed for live level display
//!
//! The live stream pushes captured samples into an [`AmplitudeTap`]; the
//! [`VisualizationFeed`] copies the most recent window into a fixed-size byte
//! frame on every rendering tick. Nothing here touches the recorded chunks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Byte value representing silence
pub const SILENCE: u8 = 128;

/// Default frame length (half of a 2048-point analysis window)
pub const DEFAULT_FRAME_LEN: usize = 1024;

/// Convert a floating sample to the analyser byte range
fn to_byte(sample: f32) -> u8 {
    (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8
}

/// Shared ring buffer of the most recent mono samples from the live stream
#[derive(Clone)]
pub struct AmplitudeTap {
    samples: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl AmplitudeTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Push interleaved samples, averaging channels down to mono
    pub fn push(&self, interleaved: &[f32], channels: u16) {
        let channels = usize::from(channels.max(1));
        let mut buffer = self.samples.lock().unwrap_or_else(|e| e.into_inner());

        for frame in interleaved.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(mono);
        }
    }

    /// Copy the most recent `out.len()` samples as analyser bytes
    ///
    /// When fewer samples have been captured, the front of `out` is padded
    /// with silence.
    pub fn snapshot_into(&self, out: &mut [u8]) {
        let buffer = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let available = buffer.len().min(out.len());
        let pad = out.len() - available;

        out[..pad].fill(SILENCE);
        for (slot, &sample) in out[pad..]
            .iter_mut()
            .zip(buffer.iter().skip(buffer.len() - available))
        {
            *slot = to_byte(sample);
        }
    }

    pub fn clear(&self) {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Fixed-length amplitude snapshot, overwritten in place on every tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationFrame {
    samples: Vec<u8>,
}

impl VisualizationFrame {
    pub fn silent(len: usize) -> Self {
        Self {
            samples: vec![SILENCE; len],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest deviation from silence, normalized to 0.0-1.0
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .map(|&b| (i16::from(b) - i16::from(SILENCE)).unsigned_abs())
            .max()
            .map_or(0.0, |d| f32::from(d) / 128.0)
    }
}

/// Samples the tap into a reusable frame
pub struct VisualizationFeed {
    tap: AmplitudeTap,
    frame: VisualizationFrame,
}

impl VisualizationFeed {
    pub fn new(tap: AmplitudeTap, frame_len: usize) -> Self {
        Self {
            tap,
            frame: VisualizationFrame::silent(frame_len),
        }
    }

    /// Take one snapshot; never blocks capture beyond the tap's short lock
    pub fn tick(&mut self) -> &VisualizationFrame {
        self.tap.snapshot_into(&mut self.frame.samples);
        &self.frame
    }
}

/// Periodic sampling loop publishing frames to subscribers
///
/// Runs on its own interval, independent of the recorder's flush cadence.
/// The loop is aborted when the task handle is dropped.
pub struct VisualizationTask {
    frames: watch::Receiver<VisualizationFrame>,
    handle: JoinHandle<()>,
}

impl VisualizationTask {
    pub fn spawn(tap: AmplitudeTap, frame_len: usize, period: Duration) -> Self {
        let (tx, frames) = watch::channel(VisualizationFrame::silent(frame_len));
        let mut feed = VisualizationFeed::new(tap, frame_len);

        let handle = tokio::spawn(async move {
            debug!("Visualization loop started ({:?} period)", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let frame = feed.tick().clone();
                if tx.send(frame).is_err() {
                    break;
                }
            }

            debug!("Visualization loop stopped");
        });

        Self { frames, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<VisualizationFrame> {
        self.frames.clone()
    }
}

impl Drop for VisualizationTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
