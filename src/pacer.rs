//! Playout pacing for outbound agent audio.
//!
//! Decoded audio arrives from the backend in bursts of arbitrary size. The
//! media sink, on the other hand, wants exactly one fixed-duration frame per
//! tick. [`AudioPacer`] sits between the two: writers append into a FIFO,
//! and [`AudioPacer::next_frame`] re-emits the data as a strictly clocked
//! sequence of fixed-size frames, padding with silence on underrun.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::audio::{AudioFormat, AudioFrame};

/// Default frame period, matching common real-time media conventions.
pub const FRAME_PERIOD: Duration = Duration::from_millis(20);

/// Options for constructing an [`AudioPacer`].
#[derive(Debug, Clone)]
pub struct PacerOptions {
    /// PCM format of the emitted frames.
    pub format: AudioFormat,
    /// Duration each emitted frame represents.
    pub frame_period: Duration,
}

impl Default for PacerOptions {
    fn default() -> Self {
        Self { format: AudioFormat::pcm16_24khz(), frame_period: FRAME_PERIOD }
    }
}

#[derive(Debug, Default)]
struct PlayoutClock {
    /// Epoch of the first emitted frame. Frame deadlines are computed from
    /// this absolute origin, not from the previous tick, so scheduling error
    /// does not accumulate.
    start: Option<Instant>,
    /// Samples per channel scheduled so far.
    timestamp: u64,
    /// Samples per channel actually emitted.
    played: u64,
    has_played: bool,
}

/// Jitter buffer and playout pacer for one outbound audio channel.
///
/// Thread-safe: the protocol event handler appends via [`enqueue`] while the
/// media sink concurrently drives [`next_frame`]. The FIFO is the only state
/// shared between the two contexts and sits behind a single lock.
///
/// [`enqueue`]: AudioPacer::enqueue
/// [`next_frame`]: AudioPacer::next_frame
#[derive(Debug)]
pub struct AudioPacer {
    format: AudioFormat,
    frame_samples: usize,
    live: AtomicBool,
    fifo: Mutex<VecDeque<i16>>,
    pushed_samples: AtomicU64,
    clock: Mutex<PlayoutClock>,
}

impl AudioPacer {
    /// Create a pacer with the given options.
    pub fn new(options: PacerOptions) -> Self {
        let frame_samples =
            (options.format.sample_rate as f64 * options.frame_period.as_secs_f64()) as usize;
        Self {
            format: options.format,
            frame_samples,
            live: AtomicBool::new(true),
            fifo: Mutex::new(VecDeque::new()),
            pushed_samples: AtomicU64::new(0),
            clock: Mutex::new(PlayoutClock::default()),
        }
    }

    /// PCM format of emitted frames.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Samples per channel in each emitted frame.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Whether the channel accepts audio.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Mark the channel live or dead. Enqueues on a dead channel are dropped.
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    /// Append interleaved PCM samples to the FIFO.
    ///
    /// No-op (with a diagnostic) when the channel is not live. Safe to call
    /// from the event-handling context while the emit path runs concurrently.
    pub fn enqueue(&self, samples: &[i16]) {
        if !self.is_live() {
            tracing::debug!(samples = samples.len(), "pacer not live, dropping audio");
            return;
        }
        if samples.is_empty() {
            return;
        }
        {
            let mut fifo = self.fifo.lock();
            fifo.extend(samples.iter().copied());
        }
        let per_channel = samples.len() as u64 / self.format.channels.max(1) as u64;
        self.pushed_samples.fetch_add(per_channel, Ordering::AcqRel);
    }

    /// Emit the next frame on schedule.
    ///
    /// Suspends until the frame's deadline (`start + n * frame_period`), then
    /// pops exactly one frame's worth of samples from the FIFO, zero-padding
    /// if fewer are buffered. The returned frame always holds exactly
    /// [`frame_samples`](AudioPacer::frame_samples) samples per channel and
    /// carries a monotonically increasing presentation timestamp.
    pub async fn next_frame(&self) -> AudioFrame {
        let (target, pts) = {
            let mut clock = self.clock.lock();
            let start = *clock.start.get_or_insert_with(Instant::now);
            clock.timestamp += self.frame_samples as u64;
            let elapsed =
                Duration::from_secs_f64(clock.timestamp as f64 / self.format.sample_rate as f64);
            (start + elapsed, clock.timestamp)
        };

        tokio::time::sleep_until(target).await;

        let samples_needed = self.frame_samples * self.format.channels as usize;
        let mut data: Vec<i16> = {
            let mut fifo = self.fifo.lock();
            let take = samples_needed.min(fifo.len());
            fifo.drain(..take).collect()
        };
        if data.len() < samples_needed {
            // Underrun: pad with silence, never emit an undersized frame.
            data.resize(samples_needed, 0);
        }

        {
            let mut clock = self.clock.lock();
            clock.played = pts;
            clock.has_played = true;
        }

        let mut frame = AudioFrame::new(data, self.format.sample_rate, self.format.channels);
        frame.pts = Some(pts);
        frame
    }

    /// Samples per channel the remote end has plausibly already heard.
    ///
    /// Once playback has started this is the emitted-sample count; before
    /// that it is derived as pushed minus buffered. This is the value the
    /// barge-in truncation math is based on.
    pub fn played_samples(&self) -> u64 {
        {
            let clock = self.clock.lock();
            if clock.has_played {
                return clock.played;
            }
        }
        let buffered = self.buffered_samples();
        self.pushed_samples.load(Ordering::Acquire).saturating_sub(buffered)
    }

    /// Total seconds of audio written so far.
    pub fn pushed_duration(&self) -> f64 {
        self.pushed_samples.load(Ordering::Acquire) as f64 / self.format.sample_rate as f64
    }

    /// Samples per channel currently buffered.
    pub fn buffered_samples(&self) -> u64 {
        self.fifo.lock().len() as u64 / self.format.channels.max(1) as u64
    }

    /// Seconds of audio currently buffered.
    pub fn buffered_duration(&self) -> f64 {
        self.buffered_samples() as f64 / self.format.sample_rate as f64
    }

    /// Discard buffered content without touching the playout statistics.
    ///
    /// Used when queued audio must not be heard (barge-in truncation). The
    /// pushed-duration bookkeeping is deliberately left alone so truncation
    /// math stays consistent.
    pub fn flush(&self) {
        *self.fifo.lock() = VecDeque::new();
    }
}
