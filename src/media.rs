//! Media collaborator seams.
//!
//! The room/transport layer that owns the actual WebRTC session is external;
//! the bridge only needs a way to pull decoded frames from a remote
//! participant's track. [`MediaSource`] is that boundary.

use async_trait::async_trait;

use crate::audio::AudioFrame;

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A source of decoded media frames, typically one remote participant's track.
///
/// `next_frame` suspends until a frame arrives and returns `None` when the
/// underlying stream ends.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Stable identifier for this source.
    fn id(&self) -> &str;

    /// Track kind. The mixer only accepts [`TrackKind::Audio`].
    fn kind(&self) -> TrackKind;

    /// Pull the next decoded frame, or `None` if the stream has ended.
    async fn next_frame(&self) -> Option<AudioFrame>;
}
