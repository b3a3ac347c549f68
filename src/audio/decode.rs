//! Decode step between the chunk buffer and the WAV encoder
//!
//! Raw `f32` segments are de-interleaved directly. Containerized segments
//! (WAV, OGG, MKV/WebM, MP4) are detected and decoded with symphonia.

use std::io::Cursor;
use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::backend::SegmentFormat;
use super::chunk::ChunkBatch;
use crate::error::{CaptureError, CaptureResult};

/// Decoded multi-channel floating-point audio
///
/// One sequence per channel. Values are nominally in [-1.0, 1.0] but a decoder
/// may overshoot; the encoder clamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Split interleaved samples into per-channel sequences
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], channel_count: u16, sample_rate: u32) -> Self {
        let count = usize::from(channel_count.max(1));
        let frames = samples.len() / count;
        let mut channels = vec![Vec::with_capacity(frames); count];

        for frame in samples.chunks_exact(count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel, taken from the first channel
    pub fn length_per_channel(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.length_per_channel() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode a sealed batch into samples
pub fn decode(batch: &ChunkBatch, format: &SegmentFormat) -> CaptureResult<SampleBuffer> {
    info!(
        "Decoding {} segments ({} bytes) as {:?}",
        batch.len(),
        batch.total_bytes(),
        format
    );

    let samples = match format {
        SegmentFormat::RawF32 {
            sample_rate,
            channels,
        } => decode_raw_f32(&batch.concat(), *sample_rate, *channels)?,
        SegmentFormat::Container { mime_type } => {
            if batch.is_empty() {
                return Err(CaptureError::DecodeFailed(
                    "no audio was captured".to_string(),
                ));
            }
            decode_container(batch.concat(), mime_type)?
        }
    };

    info!(
        "Decoded {:.2}s of audio: {} Hz, {} channels, {} frames",
        samples.duration_seconds(),
        samples.sample_rate(),
        samples.channel_count(),
        samples.length_per_channel()
    );

    Ok(samples)
}

/// Serialize interleaved samples as raw little-endian `f32` segment bytes
pub fn raw_f32_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn decode_raw_f32(bytes: &[u8], sample_rate: u32, channels: u16) -> CaptureResult<SampleBuffer> {
    if channels == 0 || sample_rate == 0 {
        return Err(CaptureError::DecodeFailed(format!(
            "invalid raw stream layout: {} Hz, {} channels",
            sample_rate, channels
        )));
    }

    if bytes.len() % 4 != 0 {
        return Err(CaptureError::DecodeFailed(format!(
            "raw stream length {} is not a whole number of f32 samples",
            bytes.len()
        )));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    if samples.len() % usize::from(channels) != 0 {
        return Err(CaptureError::DecodeFailed(format!(
            "raw stream ends mid-frame ({} samples, {} channels)",
            samples.len(),
            channels
        )));
    }

    Ok(SampleBuffer::from_interleaved(&samples, channels, sample_rate))
}

fn decode_container(bytes: Vec<u8>, mime_type: &str) -> CaptureResult<SampleBuffer> {
    let failed = |what: &str, e: SymphoniaError| {
        CaptureError::DecodeFailed(format!("{} ({}): {}", what, mime_type, e))
    };

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(mime_type);

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| failed("failed to detect captured stream format", e))?;

    let mut format = detected.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CaptureError::DecodeFailed("no audio track in captured stream".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channel_count = track
        .codec_params
        .channels
        .map_or(0, |c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| failed("unsupported codec", e))?;

    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(failed("failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(failed("failed to decode packet", e)),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channel_count = spec.channels.count() as u16;

        let mut buffer = InterleavedBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buffer.samples());
    }

    if sample_rate == 0 || channel_count == 0 {
        return Err(CaptureError::DecodeFailed(
            "captured stream did not declare a sample rate or channel layout".to_string(),
        ));
    }

    Ok(SampleBuffer::from_interleaved(
        &interleaved,
        channel_count,
        sample_rate,
    ))
}
