//! Inbound conversation fan-in.
//!
//! Every remote participant contributes one audio track. The mixer pulls
//! frames from each registered source on its own task, funnels them through
//! a shared resampler into the format the backend expects, and exposes the
//! merged stream through a non-blocking [`recv`](ConversationMixer::recv).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::audio::{AudioChunk, Resampler};
use crate::error::{BridgeError, Result};
use crate::media::{MediaSource, TrackKind};

/// Default sample rate for upstream transmission (16 kHz mono).
pub const UPSTREAM_SAMPLE_RATE: u32 = 16000;

/// Fans multiple inbound audio sources into a single resampled stream.
///
/// Created once per session. [`stop`](ConversationMixer::stop) is terminal;
/// a new mixer must be created for a new session.
pub struct ConversationMixer {
    id: String,
    active: Arc<AtomicBool>,
    resampler: Arc<Resampler>,
    sources: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl ConversationMixer {
    /// Create a mixer targeting [`UPSTREAM_SAMPLE_RATE`].
    pub fn new() -> Self {
        Self::with_target_rate(UPSTREAM_SAMPLE_RATE)
    }

    /// Create a mixer with a custom target sample rate.
    pub fn with_target_rate(target_rate: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            active: Arc::new(AtomicBool::new(true)),
            resampler: Arc::new(Resampler::new(target_rate)),
            sources: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Opaque conversation id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the mixer is still accepting and producing audio.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of currently registered sources.
    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Register a source and start pulling frames from it.
    ///
    /// Fails if the mixer has been stopped, the source is not an audio track,
    /// or a source with the same id is already registered. The source's own
    /// timestamps are discarded; the playout pacer imposes its own clock.
    pub fn add_source(&self, source: Arc<dyn MediaSource>) -> Result<()> {
        if !self.is_active() {
            return Err(BridgeError::Closed);
        }
        if source.kind() != TrackKind::Audio {
            return Err(BridgeError::media(format!(
                "source {} is not an audio track",
                source.id()
            )));
        }

        let source_id = source.id().to_string();
        let mut sources = self.sources.lock();
        if sources.contains_key(&source_id) {
            return Err(BridgeError::DuplicateSource(source_id));
        }

        let active = Arc::clone(&self.active);
        let resampler = Arc::clone(&self.resampler);
        let table = Arc::clone(&self.sources);
        let task_id = source_id.clone();
        let handle = tokio::spawn(async move {
            while active.load(Ordering::Acquire) {
                match source.next_frame().await {
                    Some(mut frame) => {
                        frame.pts = None;
                        resampler.push(&frame);
                    }
                    None => break,
                }
            }
            table.lock().remove(&task_id);
            tracing::debug!(source = %task_id, "mixer source ended");
        });

        sources.insert(source_id, handle);
        Ok(())
    }

    /// Remove a source and cancel its pull task.
    pub fn remove_source(&self, id: &str) {
        if let Some(handle) = self.sources.lock().remove(id) {
            handle.abort();
        }
    }

    /// Pull the next resampled chunk, if any is buffered.
    ///
    /// Never blocks; `None` means "try again later", not an error. Yields
    /// nothing once the mixer has been stopped.
    pub fn recv(&self) -> Option<AudioChunk> {
        if !self.is_active() {
            return None;
        }
        self.resampler.pop_chunk()
    }

    /// Stop the mixer: cancel every source task, clear the source table and
    /// reset the resampler. Terminal.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            for (_, handle) in self.sources.lock().drain() {
                handle.abort();
            }
            self.resampler.clear();
            tracing::debug!(conversation = %self.id, "mixer stopped");
        }
    }
}

impl Default for ConversationMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversationMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMixer")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("sources", &self.source_count())
            .finish()
    }
}
