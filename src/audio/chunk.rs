use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::RecorderEvent;
use crate::error::{CaptureError, CaptureResult};

/// Append-only buffer of raw captured segments, in capture order
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    segments: Vec<Vec<u8>>,
    total_bytes: usize,
    discarded: usize,
    sealed: bool,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one flushed segment
    ///
    /// Returns `false` when the segment was not kept: zero-length segments are
    /// dropped, and nothing is accepted once the buffer is sealed.
    pub fn append(&mut self, segment: Vec<u8>) -> bool {
        if self.sealed {
            warn!("Dropping {} byte segment received after stop", segment.len());
            return false;
        }

        if segment.is_empty() {
            self.discarded += 1;
            return false;
        }

        self.total_bytes += segment.len();
        self.segments.push(segment);
        true
    }

    /// Stop accepting segments
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of zero-length segments that were dropped
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Hand the segments over as one immutable batch
    pub fn into_batch(mut self) -> ChunkBatch {
        self.seal();
        ChunkBatch {
            segments: self.segments,
            total_bytes: self.total_bytes,
        }
    }

    /// Drain recorder events until the final flush arrives
    ///
    /// `segments_seen` is bumped for every kept segment so callers can report
    /// progress while the buffer is owned by this task.
    pub async fn accumulate(
        mut recorder_rx: mpsc::Receiver<RecorderEvent>,
        segments_seen: Arc<AtomicUsize>,
    ) -> ChunkBatch {
        let mut buffer = ChunkBuffer::new();

        while let Some(event) = recorder_rx.recv().await {
            match event {
                RecorderEvent::Segment(segment) => {
                    let bytes = segment.len();
                    if buffer.append(segment) {
                        let count = segments_seen.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!("Segment {} buffered ({} bytes)", count, bytes);
                    }
                }
                RecorderEvent::Stopped => {
                    buffer.seal();
                    break;
                }
            }
        }

        if !buffer.is_sealed() {
            warn!("Recorder channel closed without a final flush");
        }

        info!(
            "Chunk buffer sealed: {} segments, {} bytes ({} empty dropped)",
            buffer.len(),
            buffer.total_bytes(),
            buffer.discarded()
        );

        buffer.into_batch()
    }
}

/// Sealed, ordered segments handed to the decoder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkBatch {
    segments: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl ChunkBatch {
    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Concatenate segments in capture order
    pub fn concat(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total_bytes);
        for segment in &self.segments {
            bytes.extend_from_slice(segment);
        }
        bytes
    }
}

/// Background task owning the chunk buffer while a session records
///
/// Dropping the collector aborts the task and discards the buffered segments.
pub struct ChunkCollector {
    handle: Option<JoinHandle<ChunkBatch>>,
    segments_seen: Arc<AtomicUsize>,
}

impl ChunkCollector {
    pub fn spawn(recorder_rx: mpsc::Receiver<RecorderEvent>) -> Self {
        let segments_seen = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(ChunkBuffer::accumulate(
            recorder_rx,
            Arc::clone(&segments_seen),
        ));

        Self {
            handle: Some(handle),
            segments_seen,
        }
    }

    /// Segments buffered so far
    pub fn segments_seen(&self) -> usize {
        self.segments_seen.load(Ordering::SeqCst)
    }

    /// Wait for the final flush and take the sealed batch
    pub async fn finish(&mut self) -> CaptureResult<ChunkBatch> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| CaptureError::Stream("chunk buffer already collected".to_string()))?;

        let batch = handle
            .await
            .map_err(|e| CaptureError::Stream(format!("chunk collector failed: {}", e)))?;

        self.handle = None;
        Ok(batch)
    }
}

impl Drop for ChunkCollector {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
