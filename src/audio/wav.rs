//! Canonical 16-bit PCM WAV encoding
//!
//! The header is always the fixed 44-byte layout (`RIFF`/`WAVE`, a 16-byte
//! `fmt ` chunk with format code 1, then `data`), whatever the channel count.

use std::sync::Arc;
use tracing::info;

use super::decode::SampleBuffer;
use crate::error::{CaptureError, CaptureResult};

/// Size of the canonical PCM header
pub const HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FORMAT_PCM: u16 = 1;

/// Finished WAV artifact plus the metadata handed to upload
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRecording {
    wav: Arc<[u8]>,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
    pub duration_seconds: f64,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

impl EncodedRecording {
    pub fn wav_bytes(&self) -> &[u8] {
        &self.wav
    }

    pub fn len(&self) -> usize {
        self.wav.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wav.is_empty()
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }
}

/// Header fields of a canonical PCM WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    fn for_pcm16(channels: u16, sample_rate: u32, data_size: u32) -> Self {
        let block_align = channels * BYTES_PER_SAMPLE;
        Self {
            riff_size: 36 + data_size,
            format: FORMAT_PCM,
            channels,
            sample_rate,
            byte_rate: sample_rate * u32::from(block_align),
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
            data_size,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&self.riff_size.to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&self.format.to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.byte_rate.to_le_bytes());
        out.extend_from_slice(&self.block_align.to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&self.data_size.to_le_bytes());
    }

    /// Read back a canonical 44-byte header
    ///
    /// Returns `None` unless the chunk ids sit at their canonical offsets.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..HEADER_LEN)?;
        let u16_at = |at: usize| u16::from_le_bytes([header[at], header[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
        };

        if &header[0..4] != b"RIFF"
            || &header[8..12] != b"WAVE"
            || &header[12..16] != b"fmt "
            || u32_at(16) != 16
            || &header[36..40] != b"data"
        {
            return None;
        }

        Some(Self {
            riff_size: u32_at(4),
            format: u16_at(20),
            channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_size: u32_at(40),
        })
    }

    /// Frames described by the data chunk
    pub fn frames(&self) -> usize {
        if self.block_align == 0 {
            return 0;
        }
        (self.data_size / u32::from(self.block_align)) as usize
    }
}

/// Convert one floating sample to signed 16-bit PCM
///
/// Clamps to [-1.0, 1.0]; negative values scale by 32768, the rest by 32767,
/// and the result is truncated toward zero.
pub fn sample_to_pcm16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Encode samples into canonical WAV bytes
pub fn encode_wav(samples: &SampleBuffer) -> CaptureResult<Vec<u8>> {
    let channel_count = samples.channel_count();
    let frames = samples.length_per_channel();

    if channel_count == 0 {
        return Err(CaptureError::EncodingFailed(
            "sample buffer has no channels".to_string(),
        ));
    }

    if frames == 0 {
        return Err(CaptureError::EncodingFailed(
            "sample buffer has no frames".to_string(),
        ));
    }

    if samples.sample_rate() == 0 {
        return Err(CaptureError::EncodingFailed(
            "sample rate must be positive".to_string(),
        ));
    }

    if let Some((index, channel)) = samples
        .channels()
        .iter()
        .enumerate()
        .find(|(_, c)| c.len() != frames)
    {
        return Err(CaptureError::EncodingFailed(format!(
            "channel {} has {} frames, expected {}",
            index,
            channel.len(),
            frames
        )));
    }

    let channels = u16::try_from(channel_count)
        .ok()
        .filter(|c| *c <= u16::MAX / BYTES_PER_SAMPLE)
        .ok_or_else(|| {
            CaptureError::EncodingFailed(format!("too many channels: {}", channel_count))
        })?;

    let data_size = frames
        .checked_mul(channel_count * usize::from(BYTES_PER_SAMPLE))
        .and_then(|size| u32::try_from(size).ok())
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| {
            CaptureError::EncodingFailed(format!(
                "{} frames x {} channels exceeds the WAV size limit",
                frames, channel_count
            ))
        })?;

    let sample_rate = samples.sample_rate();
    u32::from(channels)
        .checked_mul(u32::from(BYTES_PER_SAMPLE))
        .and_then(|align| align.checked_mul(sample_rate))
        .ok_or_else(|| {
            CaptureError::EncodingFailed(format!(
                "byte rate overflows for {} Hz x {} channels",
                sample_rate, channels
            ))
        })?;

    let header = WavHeader::for_pcm16(channels, sample_rate, data_size);

    let mut out = Vec::with_capacity(HEADER_LEN + data_size as usize);
    header.write_to(&mut out);

    for frame in 0..frames {
        for channel in samples.channels() {
            out.extend_from_slice(&sample_to_pcm16(channel[frame]).to_le_bytes());
        }
    }

    Ok(out)
}

/// Encode samples into an [`EncodedRecording`]
pub fn encode(samples: &SampleBuffer) -> CaptureResult<EncodedRecording> {
    let wav = encode_wav(samples)?;

    let recording = EncodedRecording {
        wav: Arc::from(wav),
        sample_rate: samples.sample_rate(),
        channels: samples.channel_count() as u16,
        frames: samples.length_per_channel(),
        duration_seconds: samples.duration_seconds(),
        title: None,
        tags: Vec::new(),
        notes: None,
    };

    info!(
        "Encoded WAV: {:.2}s, {} Hz, {} channels, {} bytes",
        recording.duration_seconds,
        recording.sample_rate,
        recording.channels,
        recording.len()
    );

    Ok(recording)
}
