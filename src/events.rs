//! Wire event types for the realtime protocol.
//!
//! The protocol is a closed envelope of JSON events discriminated by a
//! `type` tag, modeled as tagged unions with an explicit `Unknown` variant so
//! unrecognized types never crash dispatch.
//!
//! Audio data is transported as raw bytes (`Vec<u8>`) internally but
//! serialized as base64 on the wire.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Custom serde for base64-encoded audio ───────────────────────────────

fn deserialize_audio_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD.decode(&s).map_err(serde::de::Error::custom)
}

fn serialize_audio_bytes<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let s = base64::engine::general_purpose::STANDARD.encode(bytes);
    serializer.serialize_str(&s)
}

// ── Client Events ───────────────────────────────────────────────────────

/// Events sent from the client to the realtime server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration.
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration payload.
        session: Value,
    },

    /// Append audio to the input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    AudioAppend {
        /// Optional event ID.
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        /// Audio data (raw bytes, serialized as base64 on the wire).
        #[serde(
            serialize_with = "serialize_audio_bytes",
            deserialize_with = "deserialize_audio_bytes"
        )]
        audio: Vec<u8>,
    },

    /// Truncate a conversation item after barge-in, telling the model how
    /// much of its utterance was actually heard.
    #[serde(rename = "conversation.item.truncate")]
    ItemTruncate {
        /// ID of the item being truncated.
        item_id: String,
        /// Content index within the item.
        content_index: u32,
        /// Milliseconds of audio that were delivered before interruption.
        audio_end_ms: u64,
    },

    /// Create a conversation item (tool output, text message).
    #[serde(rename = "conversation.item.create")]
    ItemCreate {
        /// The conversation item.
        item: Value,
    },

    /// Trigger a response from the model.
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Optional response configuration.
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<Value>,
    },
}

// ── Server Events ───────────────────────────────────────────────────────

/// Leading fields of a response as announced by `response.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseHead {
    /// Response ID.
    pub id: String,
    /// Initial status (e.g. "in_progress").
    pub status: String,
    /// Status details, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_details: Option<Value>,
    /// Token usage, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

/// Kind of an output item within a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// A spoken/written assistant message.
    Message,
    /// A function call the model wants executed.
    FunctionCall,
    /// Unrecognized item kind.
    #[serde(other)]
    Other,
}

/// An output item as delivered by `response.output_item.added`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputItem {
    /// Item ID.
    pub id: String,
    /// Item kind.
    #[serde(rename = "type")]
    pub kind: OutputKind,
    /// Role, when the item is a message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Kind of a content part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Text content.
    Text,
    /// Audio content (with transcript).
    Audio,
    /// Unrecognized content kind.
    #[serde(other)]
    Other,
}

/// A content part as delivered by `response.content_part.added`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    /// Content kind.
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Text, for text parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Transcript, for audio parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Error information from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type/code.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable error message.
    pub message: String,
    /// Additional error parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// Events received from the realtime server.
///
/// Audio data is stored as raw bytes, decoded from base64 at the transport
/// boundary so consumers never deal with encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session was created/connected.
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Unique event ID.
        event_id: String,
        /// Session details.
        session: Value,
    },

    /// Session configuration was updated.
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Unique event ID.
        event_id: String,
        /// Updated session details.
        session: Value,
    },

    /// Error occurred.
    #[serde(rename = "error")]
    Error {
        /// Unique event ID.
        event_id: String,
        /// Error details.
        error: ErrorInfo,
    },

    /// User speech started (VAD detected).
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        /// Unique event ID.
        event_id: String,
        /// Audio start time in milliseconds.
        audio_start_ms: u64,
        /// Item the speech will be attached to.
        item_id: String,
    },

    /// User speech ended (VAD detected).
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        /// Unique event ID.
        event_id: String,
        /// Audio end time in milliseconds.
        audio_end_ms: u64,
        /// Item the speech was attached to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },

    /// Audio input buffer was committed.
    #[serde(rename = "input_audio_buffer.committed")]
    AudioCommitted {
        /// Unique event ID.
        event_id: String,
        /// ID of the created item.
        item_id: String,
    },

    /// Audio input buffer was cleared.
    #[serde(rename = "input_audio_buffer.cleared")]
    AudioCleared {
        /// Unique event ID.
        event_id: String,
    },

    /// Conversation item was created.
    #[serde(rename = "conversation.item.created")]
    ItemCreated {
        /// Unique event ID.
        event_id: String,
        /// The created item.
        item: Value,
    },

    /// Conversation item was truncated (acknowledges a truncate request).
    #[serde(rename = "conversation.item.truncated")]
    ItemTruncated {
        /// Unique event ID.
        event_id: String,
        /// ID of the truncated item.
        item_id: String,
        /// Content index within the item.
        content_index: u32,
        /// Milliseconds the item was truncated to.
        audio_end_ms: u64,
    },

    /// Response generation started.
    #[serde(rename = "response.created")]
    ResponseCreated {
        /// Unique event ID.
        event_id: String,
        /// Response head.
        response: ResponseHead,
    },

    /// Response generation completed.
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Unique event ID.
        event_id: String,
        /// Final response details.
        response: Value,
    },

    /// Response output item added.
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Output index.
        output_index: u32,
        /// The output item.
        item: OutputItem,
    },

    /// Response output item completed.
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Output index.
        output_index: u32,
        /// The completed item.
        item: Value,
    },

    /// Content part added to an output item.
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Content index.
        content_index: u32,
        /// The content part.
        part: ContentPart,
    },

    /// Content part completed.
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Content index.
        content_index: u32,
        /// The completed part.
        part: Value,
    },

    /// Audio delta (chunk of output audio as raw bytes).
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Content index.
        content_index: u32,
        /// Audio data (raw bytes, serialized as base64 on the wire).
        #[serde(
            serialize_with = "serialize_audio_bytes",
            deserialize_with = "deserialize_audio_bytes"
        )]
        delta: Vec<u8>,
    },

    /// Audio output completed.
    #[serde(rename = "response.audio.done")]
    AudioDone {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Content index.
        content_index: u32,
    },

    /// Text output completed.
    #[serde(rename = "response.text.done")]
    TextDone {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Content index.
        content_index: u32,
        /// Complete text.
        text: String,
    },

    /// Audio transcript delta.
    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Content index.
        content_index: u32,
        /// Transcript delta.
        delta: String,
    },

    /// Audio transcript completed.
    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Content index.
        content_index: u32,
        /// Complete transcript.
        transcript: String,
    },

    /// Function call completed; arguments are fully accumulated.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallDone {
        /// Unique event ID.
        event_id: String,
        /// Response ID.
        response_id: String,
        /// Item ID.
        item_id: String,
        /// Output index.
        output_index: u32,
        /// Call ID.
        call_id: String,
        /// Function name.
        name: String,
        /// Complete arguments as a JSON string.
        arguments: String,
    },

    /// Unknown event type (for forward compatibility).
    #[serde(other)]
    Unknown,
}

// ── Tool envelope ───────────────────────────────────────────────────────

/// A function call surfaced to the external tool handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (used for the response).
    pub call_id: String,
    /// Function name.
    pub name: String,
    /// Arguments as JSON.
    pub arguments: Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The result value sent back to the model.
    pub result: Value,
    /// Whether the model should respond immediately with this result.
    pub end_of_turn: bool,
}

impl ToolOutput {
    /// Create a tool output that ends the turn.
    pub fn new(result: impl Serialize) -> Self {
        Self { result: serde_json::to_value(result).unwrap_or(Value::Null), end_of_turn: true }
    }

    /// Create a tool output that leaves the turn open.
    pub fn deferred(result: impl Serialize) -> Self {
        Self { result: serde_json::to_value(result).unwrap_or(Value::Null), end_of_turn: false }
    }
}
