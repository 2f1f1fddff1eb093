//! Server-driven response state.
//!
//! The backend streams each logical turn as a three-level hierarchy: a
//! response, its output items, and each item's content parts. Events address
//! parts by `(response_id, output_index, content_index)` and are delivered
//! with strictly increasing indices; the [`ResponseLedger`] enforces that
//! contract and rejects references to entries that do not exist yet.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use crate::audio::AudioChunk;
use crate::error::{BridgeError, Result};
use crate::events::{ContentKind, ContentPart, OutputItem, OutputKind, ResponseHead, ToolCall};

/// An in-flight (or finished) response.
///
/// Entries are created on `response.created` and are *not* auto-expired;
/// they accumulate for the life of the connection unless the caller prunes
/// them via [`ResponseLedger::remove`] or [`ResponseLedger::clear`].
#[derive(Debug, Clone)]
pub struct PendingResponse {
    /// Response ID.
    pub id: String,
    /// Last reported status.
    pub status: String,
    /// Status details, if reported.
    pub status_details: Option<Value>,
    /// Token usage, if reported.
    pub usage: Option<Value>,
    /// When the response was announced.
    pub created_at: Instant,
    /// When the first content part arrived.
    pub first_token_at: Option<Instant>,
    /// Output items in delivery order.
    pub outputs: Vec<ResponseOutput>,
}

/// One output item of a response.
#[derive(Debug, Clone)]
pub struct ResponseOutput {
    /// Parent response ID.
    pub response_id: String,
    /// Item ID.
    pub item_id: String,
    /// Position within the response.
    pub index: u32,
    /// Item kind.
    pub kind: OutputKind,
    /// Role, when the item is a message.
    pub role: Option<String>,
    /// Content parts in delivery order.
    pub contents: Vec<ResponseContent>,
}

/// One content part of an output item.
#[derive(Debug, Clone)]
pub struct ResponseContent {
    /// Owning item ID.
    pub item_id: String,
    /// Position within the item.
    pub content_index: u32,
    /// Content kind.
    pub kind: ContentKind,
    /// Accumulated text or transcript.
    pub text: String,
    /// Audio chunks in arrival order.
    pub audio: Vec<AudioChunk>,
    /// Tool calls attributed to this content.
    pub tool_calls: Vec<ToolCall>,
}

/// All pending responses of one connection, keyed by response id.
#[derive(Debug, Default)]
pub struct ResponseLedger {
    responses: HashMap<String, PendingResponse>,
}

impl ResponseLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly announced response.
    pub fn insert_response(&mut self, head: &ResponseHead) {
        let response = PendingResponse {
            id: head.id.clone(),
            status: head.status.clone(),
            status_details: head.status_details.clone(),
            usage: head.usage.clone(),
            created_at: Instant::now(),
            first_token_at: None,
            outputs: Vec::new(),
        };
        self.responses.insert(head.id.clone(), response);
    }

    /// Append an output item at the given index.
    ///
    /// The parent response must exist and the index must be the next one in
    /// sequence; anything else is a protocol violation.
    pub fn add_output(&mut self, response_id: &str, output_index: u32, item: &OutputItem) -> Result<()> {
        let response = self.response_mut(response_id)?;
        if output_index as usize != response.outputs.len() {
            return Err(BridgeError::protocol(format!(
                "output index {} out of order for response {} (expected {})",
                output_index,
                response_id,
                response.outputs.len()
            )));
        }
        response.outputs.push(ResponseOutput {
            response_id: response_id.to_string(),
            item_id: item.id.clone(),
            index: output_index,
            kind: item.kind,
            role: item.role.clone(),
            contents: Vec::new(),
        });
        Ok(())
    }

    /// Append a content part at the given index, stamping `first_token_at`
    /// on the parent response the first time any content is added.
    pub fn add_content(
        &mut self,
        response_id: &str,
        output_index: u32,
        content_index: u32,
        part: &ContentPart,
    ) -> Result<()> {
        let response = self.response_mut(response_id)?;
        let first_token_at = &mut response.first_token_at;
        let output = Self::output_mut(response_id, &mut response.outputs, output_index)?;
        if content_index as usize != output.contents.len() {
            return Err(BridgeError::protocol(format!(
                "content index {} out of order for item {} (expected {})",
                content_index,
                output.item_id,
                output.contents.len()
            )));
        }
        output.contents.push(ResponseContent {
            item_id: output.item_id.clone(),
            content_index,
            kind: part.kind,
            text: part.text.clone().or_else(|| part.transcript.clone()).unwrap_or_default(),
            audio: Vec::new(),
            tool_calls: Vec::new(),
        });
        if first_token_at.is_none() {
            *first_token_at = Some(Instant::now());
        }
        Ok(())
    }

    /// Append an audio chunk to the addressed content part.
    pub fn append_audio(
        &mut self,
        response_id: &str,
        output_index: u32,
        content_index: u32,
        chunk: AudioChunk,
    ) -> Result<()> {
        let content = self.content_mut(response_id, output_index, content_index)?;
        content.audio.push(chunk);
        Ok(())
    }

    /// Append a transcript delta to the addressed content part.
    pub fn append_text(
        &mut self,
        response_id: &str,
        output_index: u32,
        content_index: u32,
        delta: &str,
    ) -> Result<()> {
        let content = self.content_mut(response_id, output_index, content_index)?;
        content.text.push_str(delta);
        Ok(())
    }

    /// Replace the text of the addressed content part with its final form.
    pub fn set_text(
        &mut self,
        response_id: &str,
        output_index: u32,
        content_index: u32,
        text: &str,
    ) -> Result<()> {
        let content = self.content_mut(response_id, output_index, content_index)?;
        content.text = text.to_string();
        Ok(())
    }

    /// Attribute a completed tool call to the addressed output item.
    pub fn record_tool_call(&mut self, response_id: &str, output_index: u32, call: ToolCall) -> Result<()> {
        let response = self.response_mut(response_id)?;
        let output = Self::output_mut(response_id, &mut response.outputs, output_index)?;
        match output.contents.first_mut() {
            Some(content) => content.tool_calls.push(call),
            None => {
                // Function-call items carry no content parts; keep the call
                // on a synthesized part so it is still inspectable.
                output.contents.push(ResponseContent {
                    item_id: output.item_id.clone(),
                    content_index: 0,
                    kind: ContentKind::Other,
                    text: String::new(),
                    audio: Vec::new(),
                    tool_calls: vec![call],
                });
            }
        }
        Ok(())
    }

    /// Update status fields from the terminal `response.done` payload.
    pub fn mark_done(&mut self, head: &ResponseHead) -> Result<()> {
        let response = self.response_mut(&head.id)?;
        response.status = head.status.clone();
        response.status_details = head.status_details.clone();
        if head.usage.is_some() {
            response.usage = head.usage.clone();
        }
        Ok(())
    }

    /// Look up a response by id.
    pub fn get(&self, response_id: &str) -> Option<&PendingResponse> {
        self.responses.get(response_id)
    }

    /// Number of tracked responses.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Remove a single response, returning it if present.
    pub fn remove(&mut self, response_id: &str) -> Option<PendingResponse> {
        self.responses.remove(response_id)
    }

    /// Drop all tracked responses.
    pub fn clear(&mut self) {
        self.responses.clear();
    }

    fn response_mut(&mut self, response_id: &str) -> Result<&mut PendingResponse> {
        self.responses
            .get_mut(response_id)
            .ok_or_else(|| BridgeError::protocol(format!("unknown response {response_id}")))
    }

    fn output_mut<'a>(
        response_id: &str,
        outputs: &'a mut [ResponseOutput],
        output_index: u32,
    ) -> Result<&'a mut ResponseOutput> {
        outputs.get_mut(output_index as usize).ok_or_else(|| {
            BridgeError::protocol(format!(
                "unknown output index {output_index} for response {response_id}"
            ))
        })
    }

    fn content_mut(
        &mut self,
        response_id: &str,
        output_index: u32,
        content_index: u32,
    ) -> Result<&mut ResponseContent> {
        let response = self.response_mut(response_id)?;
        let output = Self::output_mut(response_id, &mut response.outputs, output_index)?;
        let item_id = output.item_id.clone();
        output.contents.get_mut(content_index as usize).ok_or_else(|| {
            BridgeError::protocol(format!(
                "unknown content index {content_index} for item {item_id}"
            ))
        })
    }
}
