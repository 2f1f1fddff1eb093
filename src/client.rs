//! The protocol client.
//!
//! Owns the persistent socket to the realtime backend, drives the session
//! handshake, dispatches inbound events into the response hierarchy and the
//! playout pacer, implements barge-in truncation, and recovers from
//! transport failures with a fixed backoff.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::audio::{AudioChunk, AudioEncoding, AudioFormat};
use crate::config::SessionConfig;
use crate::error::{BridgeError, Result};
use crate::events::{ClientEvent, ResponseHead, ServerEvent, ToolCall, ToolOutput};
use crate::handler::{EventHandler, NoOpEventHandler, ToolHandler};
use crate::mixer::{ConversationMixer, UPSTREAM_SAMPLE_RATE};
use crate::pacer::{AudioPacer, PacerOptions};
use crate::response::{PendingResponse, ResponseLedger};
use crate::transport::{Connection, Transport, WsTransport};

/// Default realtime endpoint.
pub const DEFAULT_BASE_URL: &str = "wss://api.openai.com/v1/realtime";

/// Connection lifecycle of a [`ProtocolClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Transport being opened.
    Connecting,
    /// Handshake sent; waiting for the loops to be scheduled.
    SessionConfigured,
    /// Fully operational.
    Running,
    /// Transport lost; waiting out the backoff.
    Reconnecting,
    /// Explicitly closed. Terminal.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::SessionConfigured => "session_configured",
            Self::Running => "running",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Connection options for the client.
#[derive(Clone)]
pub struct ClientOptions {
    /// Base endpoint URL.
    pub base_url: String,
    /// Model identifier, appended as a query parameter.
    pub model: String,
    /// API credential.
    pub api_key: SecretString,
    /// Delay before each reconnect attempt.
    pub reconnect_backoff: Duration,
    /// Poll interval of the outbound drain loop when the mixer is empty.
    pub drain_interval: Duration,
}

impl ClientOptions {
    /// Create options for the default endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            reconnect_backoff: Duration::from_secs(5),
            drain_interval: Duration::from_millis(10),
        }
    }

    /// Set a custom base URL (for proxies or alternative endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the reconnect backoff.
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    fn url(&self) -> Result<Url> {
        Url::parse(&format!("{}?model={}", self.base_url, self.model))
            .map_err(|e| BridgeError::config(format!("invalid endpoint url: {e}")))
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Authorization".to_string(), format!("Bearer {}", self.api_key.expose_secret())),
            ("OpenAI-Beta".to_string(), "realtime=v1".to_string()),
        ]
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("reconnect_backoff", &self.reconnect_backoff)
            .finish()
    }
}

/// Builder for [`ProtocolClient`].
pub struct ProtocolClientBuilder {
    options: Option<ClientOptions>,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn EventHandler>,
    tools: Option<Arc<dyn ToolHandler>>,
    pacer: PacerOptions,
    upstream_rate: u32,
}

impl Default for ProtocolClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolClientBuilder {
    /// Create a new builder with the WebSocket transport and no-op handler.
    pub fn new() -> Self {
        Self {
            options: None,
            config: SessionConfig::default(),
            transport: Arc::new(WsTransport),
            handler: Arc::new(NoOpEventHandler),
            tools: None,
            pacer: PacerOptions::default(),
            upstream_rate: UPSTREAM_SAMPLE_RATE,
        }
    }

    /// Set the connection options.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Substitute the transport (used by tests).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Set the tool handler.
    pub fn tool_handler(mut self, tools: impl ToolHandler + 'static) -> Self {
        self.tools = Some(Arc::new(tools));
        self
    }

    /// Set the playout pacer options.
    pub fn pacer_options(mut self, pacer: PacerOptions) -> Self {
        self.pacer = pacer;
        self
    }

    /// Set the upstream transmission sample rate.
    pub fn upstream_rate(mut self, rate: u32) -> Self {
        self.upstream_rate = rate;
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<ProtocolClient> {
        let options = self.options.ok_or_else(|| BridgeError::config("client options are required"))?;
        if options.model.is_empty() {
            return Err(BridgeError::config("model is required"));
        }
        if options.api_key.expose_secret().is_empty() {
            return Err(BridgeError::config("api key is required"));
        }
        options.url()?;
        if self.pacer.format.encoding != AudioEncoding::Pcm16 || self.pacer.format.bits_per_sample != 16 {
            return Err(BridgeError::media("playout pacer requires 16-bit PCM"));
        }
        if self.pacer.format.channels == 0 {
            return Err(BridgeError::media("playout format needs at least one channel"));
        }

        let output_format = self.pacer.format;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(ClientInner {
            options,
            config: self.config,
            transport: self.transport,
            handler: self.handler,
            tools: self.tools,
            state: RwLock::new(ConnectionState::Disconnected),
            conn: RwLock::new(None),
            ledger: Mutex::new(ResponseLedger::new()),
            pacer: Arc::new(AudioPacer::new(self.pacer)),
            mixer: Arc::new(ConversationMixer::with_target_rate(self.upstream_rate)),
            output_format,
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            shutdown_rx,
        });
        Ok(ProtocolClient { inner })
    }
}

struct ClientInner {
    options: ClientOptions,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn EventHandler>,
    tools: Option<Arc<dyn ToolHandler>>,
    state: RwLock<ConnectionState>,
    conn: RwLock<Option<Arc<dyn Connection>>>,
    ledger: Mutex<ResponseLedger>,
    pacer: Arc<AudioPacer>,
    mixer: Arc<ConversationMixer>,
    output_format: AudioFormat,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Client for the turn-based realtime protocol.
///
/// Data flows two ways: resampled room audio drains out through
/// `input_audio_buffer.append` events, and inbound audio deltas land in the
/// [`AudioPacer`] for clocked playout.
pub struct ProtocolClient {
    inner: Arc<ClientInner>,
}

impl ProtocolClient {
    /// Create a new builder.
    pub fn builder() -> ProtocolClientBuilder {
        ProtocolClientBuilder::new()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.inner.conn.read().as_ref().map(|c| c.is_open()).unwrap_or(false)
    }

    /// The outbound playout pacer.
    pub fn pacer(&self) -> Arc<AudioPacer> {
        Arc::clone(&self.inner.pacer)
    }

    /// The inbound conversation mixer.
    pub fn mixer(&self) -> Arc<ConversationMixer> {
        Arc::clone(&self.inner.mixer)
    }

    /// Snapshot of a pending response by id.
    pub fn response(&self, response_id: &str) -> Option<PendingResponse> {
        self.inner.ledger.lock().get(response_id).cloned()
    }

    /// Number of tracked responses.
    ///
    /// Responses are never evicted automatically; long-lived sessions should
    /// prune with [`clear_responses`](ProtocolClient::clear_responses).
    pub fn pending_responses(&self) -> usize {
        self.inner.ledger.lock().len()
    }

    /// Drop all tracked responses.
    pub fn clear_responses(&self) {
        self.inner.ledger.lock().clear();
    }

    /// Connect to the backend and start the session.
    ///
    /// Opens the transport, starts listening before the handshake completes
    /// so no event is missed, sends the session configuration, then starts
    /// the outbound audio drain loop.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let state = *inner.state.read();
            match state {
                ConnectionState::Closed => return Err(BridgeError::Closed),
                ConnectionState::Disconnected => {}
                _ => return Err(BridgeError::config(format!("connect() while {state}"))),
            }
        }

        inner.set_state(ConnectionState::Connecting);
        let conn = match inner.open_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                inner.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let listener = tokio::spawn(Arc::clone(inner).run_listener(
            Arc::clone(&conn),
            inner.shutdown_rx.clone(),
        ));

        if let Err(e) = inner.configure_session(&conn).await {
            listener.abort();
            *inner.conn.write() = None;
            inner.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        inner.set_state(ConnectionState::SessionConfigured);

        let drain = tokio::spawn(Arc::clone(inner).run_drain(inner.shutdown_rx.clone()));
        {
            let mut tasks = inner.tasks.lock();
            tasks.push(listener);
            tasks.push(drain);
        }
        inner.set_state(ConnectionState::Running);
        info!(model = %inner.options.model, "connected to realtime backend");
        Ok(())
    }

    /// Send raw PCM to the input audio buffer.
    ///
    /// Fails with [`BridgeError::NotConnected`] while the transport is
    /// absent; audio sends are best-effort and safe to drop.
    pub async fn send_audio_chunk(&self, audio: &[u8]) -> Result<()> {
        self.inner.send_audio_chunk(audio).await
    }

    /// Tell the backend how much of an item's audio was actually heard.
    pub async fn truncate(&self, item_id: &str, content_index: u32, audio_end_ms: u64) -> Result<()> {
        self.inner
            .send_event(&ClientEvent::ItemTruncate {
                item_id: item_id.to_string(),
                content_index,
                audio_end_ms,
            })
            .await
    }

    /// Close the client: cancel the listener and drain tasks, stop the
    /// mixer, clear pending session state and close the transport. Terminal.
    pub async fn close(&self) -> Result<()> {
        let inner = &self.inner;
        if *inner.state.read() == ConnectionState::Closed {
            return Ok(());
        }
        inner.set_state(ConnectionState::Closed);
        let _ = inner.shutdown_tx.send(true);

        inner.mixer.stop();
        inner.pacer.set_live(false);
        for task in inner.tasks.lock().drain(..) {
            task.abort();
        }
        inner.ledger.lock().clear();

        let conn = inner.conn.write().take();
        if let Some(conn) = conn {
            let _ = conn.close().await;
        }
        info!("client closed");
        Ok(())
    }
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("model", &self.inner.options.model)
            .field("state", &self.state())
            .finish()
    }
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        let mut guard = self.state.write();
        debug!(from = %*guard, to = %state, "state transition");
        *guard = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn open_connection(&self) -> Result<Arc<dyn Connection>> {
        let url = self.options.url()?;
        let headers = self.options.headers();
        let conn = self.transport.connect(&url, &headers).await?;
        *self.conn.write() = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Send the session handshake. Called exactly once per physical
    /// connection.
    async fn configure_session(&self, conn: &Arc<dyn Connection>) -> Result<()> {
        let session = serde_json::to_value(&self.config)?;
        let payload = serde_json::to_string(&ClientEvent::SessionUpdate { session })?;
        conn.send(&payload).await?;
        debug!("session configuration sent");
        Ok(())
    }

    async fn send_event(&self, event: &ClientEvent) -> Result<()> {
        let conn = self.conn.read().clone().ok_or(BridgeError::NotConnected)?;
        let payload = serde_json::to_string(event)?;
        conn.send(&payload).await
    }

    async fn send_audio_chunk(&self, audio: &[u8]) -> Result<()> {
        let event = ClientEvent::AudioAppend {
            event_id: Some(uuid::Uuid::new_v4().to_string()),
            audio: audio.to_vec(),
        };
        self.send_event(&event).await
    }

    /// Inbound event loop. Lives across reconnects; exits on shutdown or
    /// explicit close.
    async fn run_listener(
        self: Arc<Self>,
        mut conn: Arc<dyn Connection>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                msg = conn.recv() => match msg {
                    Some(Ok(text)) => self.handle_message(&text).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "transport failure");
                        match self.reconnect(&mut shutdown).await {
                            Some(new_conn) => conn = new_conn,
                            None => break,
                        }
                    }
                    None => {
                        if self.state() == ConnectionState::Closed {
                            break;
                        }
                        warn!("connection closed by peer");
                        match self.reconnect(&mut shutdown).await {
                            Some(new_conn) => conn = new_conn,
                            None => break,
                        }
                    }
                },
            }
        }
        debug!("listener exited");
    }

    /// Reconnect with a fixed backoff until a connection sticks or the
    /// client is closed. The backoff wait itself is cancellable by close.
    async fn reconnect(
        self: &Arc<Self>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Arc<dyn Connection>> {
        *self.conn.write() = None;
        loop {
            self.set_state(ConnectionState::Reconnecting);
            tokio::select! {
                _ = shutdown.changed() => return None,
                _ = tokio::time::sleep(self.options.reconnect_backoff) => {}
            }

            self.set_state(ConnectionState::Connecting);
            match self.open_connection().await {
                Ok(conn) => {
                    // One handshake per physical connection, same as the
                    // initial connect.
                    if let Err(e) = self.configure_session(&conn).await {
                        warn!(error = %e, "handshake failed after reconnect");
                        *self.conn.write() = None;
                        continue;
                    }
                    self.set_state(ConnectionState::SessionConfigured);
                    self.set_state(ConnectionState::Running);
                    info!("reconnected to realtime backend");
                    return Some(conn);
                }
                Err(e) => {
                    warn!(error = %e, "reconnect attempt failed");
                    continue;
                }
            }
        }
    }

    /// Outbound audio drain loop: forward resampled room audio while the
    /// mixer is active, backing off briefly when there is nothing to send.
    async fn run_drain(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() || !self.mixer.is_active() {
                break;
            }
            let sent = match self.mixer.recv() {
                Some(chunk) => match self.send_audio_chunk(&chunk.data).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(error = %e, bytes = chunk.data.len(), "dropping audio chunk");
                        false
                    }
                },
                None => false,
            };
            if !sent {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.options.drain_interval) => {}
                }
            }
        }
        debug!("drain loop exited");
    }

    /// Decode and route one inbound event. Exactly one handler per
    /// recognized kind; anything malformed is contained here.
    async fn handle_message(self: &Arc<Self>, raw: &str) {
        let event: ServerEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "undecodable event, dropping");
                return;
            }
        };

        match event {
            ServerEvent::SessionCreated { .. } => info!("session created"),
            ServerEvent::SessionUpdated { .. } => debug!("session updated"),
            ServerEvent::ResponseCreated { response, .. } => {
                debug!(response_id = %response.id, "response created");
                self.ledger.lock().insert_response(&response);
            }
            ServerEvent::ResponseDone { response, .. } => self.on_response_done(response).await,
            ServerEvent::OutputItemAdded { response_id, output_index, item, .. } => {
                let result = self.ledger.lock().add_output(&response_id, output_index, &item);
                if let Err(e) = result {
                    warn!(error = %e, "dropping output_item.added");
                }
            }
            ServerEvent::OutputItemDone { response_id, output_index, .. } => {
                debug!(%response_id, output_index, "output item done");
            }
            ServerEvent::ContentPartAdded {
                response_id, output_index, content_index, part, ..
            } => {
                let result =
                    self.ledger.lock().add_content(&response_id, output_index, content_index, &part);
                if let Err(e) = result {
                    warn!(error = %e, "dropping content_part.added");
                }
            }
            ServerEvent::ContentPartDone { response_id, output_index, content_index, .. } => {
                debug!(%response_id, output_index, content_index, "content part done");
            }
            ServerEvent::AudioDelta {
                response_id, item_id, output_index, content_index, delta, ..
            } => {
                self.on_audio_delta(response_id, item_id, output_index, content_index, delta).await;
            }
            ServerEvent::AudioDone { item_id, .. } => debug!(%item_id, "audio done"),
            ServerEvent::TextDone {
                response_id, item_id, output_index, content_index, text, ..
            } => {
                let result =
                    self.ledger.lock().set_text(&response_id, output_index, content_index, &text);
                if let Err(e) = result {
                    warn!(error = %e, "dropping text.done");
                    return;
                }
                if let Err(e) = self.handler.on_text(&text, &item_id).await {
                    debug!(error = %e, "text handler failed");
                }
            }
            ServerEvent::TranscriptDelta {
                response_id, item_id, output_index, content_index, delta, ..
            } => {
                let result =
                    self.ledger.lock().append_text(&response_id, output_index, content_index, &delta);
                if let Err(e) = result {
                    warn!(error = %e, "dropping transcript delta");
                    return;
                }
                if let Err(e) = self.handler.on_transcript(&delta, &item_id).await {
                    debug!(error = %e, "transcript handler failed");
                }
            }
            ServerEvent::TranscriptDone { item_id, .. } => debug!(%item_id, "transcript done"),
            ServerEvent::SpeechStarted { audio_start_ms, item_id, .. } => {
                self.on_speech_started(audio_start_ms, item_id).await;
            }
            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                debug!(audio_end_ms, "speech stopped");
                if let Err(e) = self.handler.on_speech_stopped(audio_end_ms).await {
                    debug!(error = %e, "speech handler failed");
                }
            }
            ServerEvent::AudioCommitted { item_id, .. } => {
                debug!(%item_id, "input audio committed");
            }
            ServerEvent::AudioCleared { .. } => debug!("input audio cleared"),
            ServerEvent::ItemCreated { .. } => debug!("conversation item created"),
            ServerEvent::ItemTruncated { item_id, audio_end_ms, .. } => {
                debug!(%item_id, audio_end_ms, "conversation item truncated");
            }
            ServerEvent::FunctionCallDone {
                response_id, output_index, call_id, name, arguments, ..
            } => {
                self.on_function_call(response_id, output_index, call_id, name, arguments).await;
            }
            ServerEvent::Error { error: info, .. } => {
                let err = BridgeError::server(info.code.unwrap_or_default(), info.message);
                error!(error = %err, "server error event");
                if let Err(e) = self.handler.on_error(&err).await {
                    debug!(error = %e, "error handler failed");
                }
            }
            ServerEvent::Unknown => debug!("unrecognized event type"),
        }
    }

    async fn on_response_done(&self, response: Value) {
        if let Ok(head) = serde_json::from_value::<ResponseHead>(response) {
            if let Err(e) = self.ledger.lock().mark_done(&head) {
                warn!(error = %e, "response.done for unknown response");
            }
        }
        debug!("response done");
        if let Err(e) = self.handler.on_response_done().await {
            debug!(error = %e, "response handler failed");
        }
    }

    async fn on_audio_delta(
        self: &Arc<Self>,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: Vec<u8>,
    ) {
        if delta.len() % (self.output_format.bytes_per_frame() as usize) != 0 {
            let err = BridgeError::decode(format!(
                "audio delta of {} bytes is not aligned to the negotiated format",
                delta.len()
            ));
            warn!(error = %err, "dropping audio delta");
            if let Err(e) = self.handler.on_error(&err).await {
                debug!(error = %e, "error handler failed");
            }
            return;
        }

        let chunk = AudioChunk::new(delta, self.output_format);
        let samples = match chunk.to_i16_samples() {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, "dropping audio delta");
                return;
            }
        };

        {
            // Bytes payloads make this clone cheap; the ledger and the
            // handler share the same underlying buffer.
            let mut ledger = self.ledger.lock();
            if let Err(e) =
                ledger.append_audio(&response_id, output_index, content_index, chunk.clone())
            {
                warn!(error = %e, "dropping audio delta");
                return;
            }
        }

        self.pacer.enqueue(&samples);
        if let Err(e) = self.handler.on_audio(&chunk.data, &item_id).await {
            debug!(error = %e, "audio handler failed");
        }
    }

    /// Barge-in: the remote participant started speaking while the agent's
    /// channel is live. Report how much of the utterance was actually heard
    /// and discard the rest of the queued playout.
    async fn on_speech_started(self: &Arc<Self>, audio_start_ms: u64, item_id: String) {
        debug!(audio_start_ms, "speech started");
        if let Err(e) = self.handler.on_speech_started(audio_start_ms).await {
            debug!(error = %e, "speech handler failed");
        }

        if !self.pacer.is_live() {
            return;
        }
        // The played-sample count approximates what the remote party has
        // heard; network and device latency are not modeled.
        let sample_rate = self.pacer.format().sample_rate as u64;
        let audio_end_ms = self.pacer.played_samples() * 1000 / sample_rate;
        self.pacer.flush();

        let client = Arc::clone(self);
        tokio::spawn(async move {
            let event = ClientEvent::ItemTruncate { item_id, content_index: 0, audio_end_ms };
            if let Err(e) = client.send_event(&event).await {
                warn!(error = %e, "failed to send truncate");
            }
        });
    }

    async fn on_function_call(
        self: &Arc<Self>,
        response_id: String,
        output_index: u32,
        call_id: String,
        name: String,
        arguments: String,
    ) {
        let arguments: Value =
            serde_json::from_str(&arguments).unwrap_or(Value::Object(Default::default()));
        let call = ToolCall { call_id, name, arguments };

        {
            let mut ledger = self.ledger.lock();
            if let Err(e) = ledger.record_tool_call(&response_id, output_index, call.clone()) {
                debug!(error = %e, "tool call not recorded");
            }
        }

        let Some(tools) = self.tools.clone() else {
            warn!(name = %call.name, "no tool handler registered, ignoring function call");
            return;
        };

        let client = Arc::clone(self);
        tokio::spawn(async move {
            let output = match tools.execute(&call).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, name = %call.name, "tool execution failed");
                    ToolOutput {
                        result: serde_json::json!({ "error": e.to_string() }),
                        end_of_turn: true,
                    }
                }
            };

            let item = serde_json::json!({
                "type": "function_call_output",
                "call_id": call.call_id,
                "output": output.result.to_string(),
            });
            if let Err(e) = client.send_event(&ClientEvent::ItemCreate { item }).await {
                warn!(error = %e, "failed to send tool output");
                return;
            }
            if output.end_of_turn {
                if let Err(e) =
                    client.send_event(&ClientEvent::ResponseCreate { response: None }).await
                {
                    warn!(error = %e, "failed to request response after tool output");
                }
            }
        });
    }
}
