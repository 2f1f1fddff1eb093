//! Observer and tool-dispatch seams.

use async_trait::async_trait;

use crate::error::{BridgeError, Result};
use crate::events::{ToolCall, ToolOutput};

/// Handler for events the external agent cares about.
///
/// All methods default to no-ops so implementors only override what they
/// need. Handlers run on the dispatch task; they should return quickly.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called for each decoded audio delta, after it has been queued on the
    /// playout pacer.
    async fn on_audio(&self, _audio: &[u8], _item_id: &str) -> Result<()> {
        Ok(())
    }

    /// Called when a completed text is received.
    async fn on_text(&self, _text: &str, _item_id: &str) -> Result<()> {
        Ok(())
    }

    /// Called when a transcript delta is received.
    async fn on_transcript(&self, _transcript: &str, _item_id: &str) -> Result<()> {
        Ok(())
    }

    /// Called when the remote participant starts speaking.
    async fn on_speech_started(&self, _audio_start_ms: u64) -> Result<()> {
        Ok(())
    }

    /// Called when the remote participant stops speaking.
    async fn on_speech_stopped(&self, _audio_end_ms: u64) -> Result<()> {
        Ok(())
    }

    /// Called when a response completes.
    async fn on_response_done(&self) -> Result<()> {
        Ok(())
    }

    /// Called on any contained error (server errors, decode failures).
    async fn on_error(&self, _error: &BridgeError) -> Result<()> {
        Ok(())
    }
}

/// Default no-op event handler.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventHandler;

#[async_trait]
impl EventHandler for NoOpEventHandler {}

/// Executes tool calls surfaced by the model.
///
/// The bridge routes only the envelope; what the tool does is the
/// implementor's business.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute a tool call and return its output.
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput>;
}

/// A function-based tool handler.
pub struct FnToolHandler<F>
where
    F: Fn(&ToolCall) -> Result<ToolOutput> + Send + Sync,
{
    handler: F,
}

impl<F> FnToolHandler<F>
where
    F: Fn(&ToolCall) -> Result<ToolOutput> + Send + Sync,
{
    /// Create a new function-based tool handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> ToolHandler for FnToolHandler<F>
where
    F: Fn(&ToolCall) -> Result<ToolOutput> + Send + Sync,
{
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput> {
        (self.handler)(call)
    }
}
