//! Audio format definitions and PCM utilities.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Audio encoding formats supported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AudioEncoding {
    /// 16-bit PCM audio (most common).
    #[serde(rename = "pcm16")]
    #[default]
    Pcm16,
    /// G.711 μ-law encoding.
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// G.711 A-law encoding.
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pcm16 => write!(f, "pcm16"),
            Self::G711Ulaw => write!(f, "g711_ulaw"),
            Self::G711Alaw => write!(f, "g711_alaw"),
        }
    }
}

/// Complete audio format specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 24000, 16000).
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u8,
    /// Bits per sample.
    pub bits_per_sample: u8,
    /// Audio encoding format.
    pub encoding: AudioEncoding,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_24khz()
    }
}

impl AudioFormat {
    /// Create a new audio format specification.
    pub fn new(sample_rate: u32, channels: u8, bits_per_sample: u8) -> Self {
        Self { sample_rate, channels, bits_per_sample, encoding: AudioEncoding::Pcm16 }
    }

    /// Standard PCM16 format at 24kHz (agent output default).
    pub fn pcm16_24khz() -> Self {
        Self { sample_rate: 24000, channels: 1, bits_per_sample: 16, encoding: AudioEncoding::Pcm16 }
    }

    /// PCM16 format at 16kHz (upstream transmission default).
    pub fn pcm16_16khz() -> Self {
        Self { sample_rate: 16000, channels: 1, bits_per_sample: 16, encoding: AudioEncoding::Pcm16 }
    }

    /// Bytes per sample across all channels.
    pub fn bytes_per_frame(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample / 8) as u32
    }

    /// Calculate bytes per second for this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.bytes_per_frame()
    }

    /// Calculate duration in milliseconds for a given number of bytes.
    pub fn duration_ms(&self, bytes: usize) -> f64 {
        let bytes_per_ms = self.bytes_per_second() as f64 / 1000.0;
        bytes as f64 / bytes_per_ms
    }
}

/// A decoded audio frame as it moves between the room and the bridge.
///
/// Samples are interleaved i16 PCM. The presentation timestamp is in samples
/// and is assigned by whichever clock owns the frame; inbound frames have
/// theirs discarded because the playout pacer imposes its own.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Interleaved PCM samples.
    pub data: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u8,
    /// Presentation timestamp in samples, if stamped.
    pub pts: Option<u64>,
}

impl AudioFrame {
    /// Create a new frame without a timestamp.
    pub fn new(data: Vec<i16>, sample_rate: u32, channels: u8) -> Self {
        Self { data, sample_rate, channels, pts: None }
    }

    /// Samples per channel in this frame.
    pub fn samples_per_channel(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }
}

/// Raw audio bytes with format information.
///
/// Payloads are held as [`Bytes`] so chunks can be cloned into the response
/// ledger and handed to handlers without copying the audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Raw audio data (PCM16 for `Pcm16` encoding).
    pub data: Bytes,
    /// Audio format of this chunk.
    pub format: AudioFormat,
}

impl AudioChunk {
    /// Create a new audio chunk.
    pub fn new(data: impl Into<Bytes>, format: AudioFormat) -> Self {
        Self { data: data.into(), format }
    }

    /// Get duration of this audio chunk in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.format.duration_ms(self.data.len())
    }

    /// Create a chunk from i16 samples (converts to PCM16 bytes).
    pub fn from_i16_samples(samples: &[i16], format: AudioFormat) -> Self {
        let data = bytemuck::cast_slice::<i16, u8>(samples).to_vec();
        Self::new(data, format)
    }

    /// Convert the audio data to i16 samples (assuming PCM16).
    ///
    /// Fails with a decode error if the byte length is odd.
    pub fn to_i16_samples(&self) -> Result<Vec<i16>> {
        if self.data.len() % 2 != 0 {
            return Err(BridgeError::decode(format!(
                "invalid PCM16 length: {} bytes",
                self.data.len()
            )));
        }
        Ok(bytemuck::pod_collect_to_vec::<u8, i16>(&self.data))
    }
}

/// Converts incoming frames of arbitrary rate and layout to a single mono
/// PCM16 stream at a fixed target rate, buffering the output internally.
///
/// Multiple producers may push concurrently; writes are serialized by the
/// internal lock. Consumers drain with [`Resampler::pop_chunk`].
#[derive(Debug)]
pub struct Resampler {
    target_rate: u32,
    buffer: Mutex<VecDeque<i16>>,
}

impl Resampler {
    /// Create a resampler for the given target sample rate.
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate, buffer: Mutex::new(VecDeque::new()) }
    }

    /// Target sample rate in Hz.
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Resample one frame to mono at the target rate and buffer the result.
    pub fn push(&self, frame: &AudioFrame) {
        if frame.data.is_empty() || frame.channels == 0 || frame.sample_rate == 0 {
            return;
        }
        let resampled = to_mono_rate(&frame.data, frame.channels, frame.sample_rate, self.target_rate);
        let mut buffer = self.buffer.lock();
        buffer.extend(resampled);
    }

    /// Drain all buffered samples as one chunk, or `None` if nothing is
    /// buffered. Never blocks.
    pub fn pop_chunk(&self) -> Option<AudioChunk> {
        let samples: Vec<i16> = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return None;
            }
            buffer.drain(..).collect()
        };
        let format = AudioFormat::new(self.target_rate, 1, 16);
        Some(AudioChunk::from_i16_samples(&samples, format))
    }

    /// Number of samples currently buffered.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Discard any buffered output.
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

/// Convert interleaved multi-channel samples at any rate to mono at
/// `to_rate` using linear interpolation.
fn to_mono_rate(samples: &[i16], channels: u8, from_rate: u32, to_rate: u32) -> Vec<i16> {
    let channels = channels as usize;
    let mono: Vec<i16> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|c| (c.iter().map(|&s| s as i32).sum::<i32>() / channels as i32) as i16)
            .collect()
    };
    if from_rate == to_rate {
        return mono;
    }
    let out_len = (mono.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let ratio = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        if idx + 1 < mono.len() {
            let frac = pos - idx as f64;
            let sample = mono[idx] as f64 * (1.0 - frac) + mono[idx + 1] as f64 * frac;
            out.push(sample as i16);
        } else if idx < mono.len() {
            out.push(mono[idx]);
        } else {
            break;
        }
    }
    out
}
