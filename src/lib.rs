//! # voicebridge
//!
//! Bridges a live, two-way audio stream from a real-time communication room
//! to a conversational AI backend speaking a turn-based, event-driven wire
//! protocol over a persistent WebSocket.
//!
//! ## Architecture
//!
//! Two tightly coupled subsystems do the heavy lifting: a jitter buffer and
//! playout pacer that turns bursty decoded audio into a strictly clocked
//! sequence of fixed-duration frames, and a protocol state machine that
//! tracks server-driven conversational state, handles barge-in truncation
//! and recovers from transport failures.
//!
//! ```text
//!   room media ──▶ ConversationMixer ──▶ ProtocolClient ──▶ Transport ──▶ backend
//!                   (fan-in, resample)    (audio append)     (WebSocket)
//!
//!   backend ──▶ Transport ──▶ ProtocolClient ──▶ AudioPacer ──▶ room media
//!                              (event dispatch,   (jitter buffer,
//!                               response ledger)   20 ms playout clock)
//! ```
//!
//! ## Features
//!
//! - **AudioPacer**: jitter buffer with an absolute-epoch playout clock,
//!   silence padding on underrun and played-sample accounting for barge-in
//! - **ConversationMixer**: per-participant pull tasks fanned into one
//!   resampled upstream audio stream
//! - **ProtocolClient**: session handshake, typed event dispatch into the
//!   response/output/content hierarchy, barge-in truncation and
//!   reconnect-with-backoff
//! - **Tool Calling**: function-call envelope routing to an external handler
//!
//! ## Example
//!
//! ```rust,ignore
//! use voicebridge::{ClientOptions, ProtocolClient, SessionConfig, TurnDetection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ProtocolClient::builder()
//!         .options(ClientOptions::new(api_key, "gpt-4o-realtime-preview-2024-12-17"))
//!         .config(
//!             SessionConfig::new()
//!                 .with_instructions("You are a helpful voice assistant.")
//!                 .with_voice("alloy")
//!                 .with_text_and_audio()
//!                 .with_turn_detection(TurnDetection::server_vad()),
//!         )
//!         .build()?;
//!
//!     client.connect().await?;
//!
//!     // Feed room participants into the upstream mixer...
//!     client.mixer().add_source(participant_track)?;
//!
//!     // ...and drive the playout pacer from the media sink.
//!     loop {
//!         let frame = client.pacer().next_frame().await;
//!         sink.send(frame).await?;
//!     }
//! }
//! ```

pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod media;
pub mod mixer;
pub mod pacer;
pub mod response;
pub mod transport;

// Re-exports
pub use audio::{AudioChunk, AudioEncoding, AudioFormat, AudioFrame, Resampler};
pub use client::{ClientOptions, ConnectionState, ProtocolClient, ProtocolClientBuilder};
pub use config::{SessionConfig, ToolDefinition, TranscriptionConfig, TurnDetection, TurnDetectionMode};
pub use error::{BridgeError, Result};
pub use events::{ClientEvent, ServerEvent, ToolCall, ToolOutput};
pub use handler::{EventHandler, NoOpEventHandler, ToolHandler};
pub use media::{MediaSource, TrackKind};
pub use mixer::ConversationMixer;
pub use pacer::{AudioPacer, PacerOptions, FRAME_PERIOD};
pub use response::{PendingResponse, ResponseContent, ResponseLedger, ResponseOutput};
pub use transport::{Connection, Transport, WsTransport};
