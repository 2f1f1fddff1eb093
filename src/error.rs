//! Error types for the voice bridge.

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while bridging a room to a realtime backend.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Transport-level failure (connect, send or receive).
    ///
    /// Recovered internally by reconnecting with backoff; never fatal to the
    /// dispatch loop.
    #[error("transport error: {0}")]
    Transport(String),

    /// A send was attempted while the transport is absent.
    ///
    /// Recoverable: retry after reconnection, or drop the data (audio sends
    /// are best-effort).
    #[error("not connected")]
    NotConnected,

    /// The client was explicitly closed.
    #[error("client closed")]
    Closed,

    /// An inbound event referenced a response, output or content index that
    /// does not exist. The event is dropped and state is left unchanged.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Malformed base64 or a PCM payload of invalid length in an audio delta.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Media format mismatch (sample rate, channel count, track kind).
    #[error("media format error: {0}")]
    MediaFormat(String),

    /// A source id was added to the mixer while already registered.
    #[error("source {0} is already registered")]
    DuplicateSource(String),

    /// Tool execution failed.
    #[error("tool error: {0}")]
    Tool(String),

    /// The server reported an error event.
    #[error("server error: {code} - {message}")]
    Server {
        /// Error code from the server.
        code: String,
        /// Error message from the server.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a new transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new protocol violation.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a new decode error.
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new media format error.
    pub fn media<S: Into<String>>(msg: S) -> Self {
        Self::MediaFormat(msg.into())
    }

    /// Create a new server error.
    pub fn server<S: Into<String>>(code: S, message: S) -> Self {
        Self::Server { code: code.into(), message: message.into() }
    }
}
