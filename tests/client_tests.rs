//! Integration tests for the protocol client, driven through a scripted
//! in-memory transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;
use voicebridge::handler::FnToolHandler;
use voicebridge::{
    AudioFrame, BridgeError, ClientOptions, ConnectionState, Connection, EventHandler,
    MediaSource, ProtocolClient, SessionConfig, ToolOutput, TrackKind, Transport,
};

// ── Scripted transport ──────────────────────────────────────────────────

/// One scripted connection: the test pushes inbound messages (or failures)
/// through a channel and inspects everything the client sent.
struct MockConnection {
    open: AtomicBool,
    sent: StdMutex<Vec<String>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<String, String>>>,
}

impl MockConnection {
    fn sent_of_type(&self, event_type: &str) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(|v| v["type"] == event_type)
            .collect()
    }

    fn sent_types(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter_map(|v| v["type"].as_str().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send(&self, text: &str) -> voicebridge::Result<()> {
        if !self.is_open() {
            return Err(BridgeError::NotConnected);
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn recv(&self) -> Option<voicebridge::Result<String>> {
        match self.inbound.lock().await.recv().await {
            Some(Ok(text)) => Some(Ok(text)),
            Some(Err(reason)) => {
                self.open.store(false, Ordering::Release);
                Some(Err(BridgeError::transport(reason)))
            }
            // Sender dropped: a normal close.
            None => {
                self.open.store(false, Ordering::Release);
                None
            }
        }
    }

    async fn close(&self) -> voicebridge::Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

/// Hands out pre-scripted connections in order, one per `connect` call.
struct MockTransport {
    queue: StdMutex<VecDeque<Arc<MockConnection>>>,
    connects: AtomicUsize,
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &Url,
        _headers: &[(String, String)],
    ) -> voicebridge::Result<Arc<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::AcqRel);
        let conn = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BridgeError::transport("no scripted connection left"))?;
        Ok(conn as Arc<dyn Connection>)
    }
}

type Inbound = mpsc::UnboundedSender<Result<String, String>>;

fn scripted(connections: usize) -> (Arc<MockTransport>, Vec<(Arc<MockConnection>, Inbound)>) {
    let mut handles = Vec::new();
    let mut queue = VecDeque::new();
    for _ in 0..connections {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(MockConnection {
            open: AtomicBool::new(true),
            sent: StdMutex::new(Vec::new()),
            inbound: tokio::sync::Mutex::new(rx),
        });
        queue.push_back(Arc::clone(&conn));
        handles.push((conn, tx));
    }
    let transport =
        Arc::new(MockTransport { queue: StdMutex::new(queue), connects: AtomicUsize::new(0) });
    (transport, handles)
}

fn push(tx: &Inbound, event: Value) {
    tx.send(Ok(event.to_string())).unwrap();
}

fn build_client(transport: Arc<MockTransport>) -> ProtocolClient {
    let options = ClientOptions::new("test-key", "test-model")
        .with_reconnect_backoff(Duration::from_millis(10));
    ProtocolClient::builder()
        .options(options)
        .config(SessionConfig::new().with_voice("alloy").with_text_and_audio())
        .transport(transport)
        .build()
        .unwrap()
}

/// Poll until the condition holds or give up after ~1 s of paused time.
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn response_created(tx: &Inbound, id: &str) {
    push(tx, json!({
        "type": "response.created",
        "event_id": "evt_rc",
        "response": {"id": id, "status": "in_progress"},
    }));
}

fn output_item_added(tx: &Inbound, response_id: &str, index: u32, item_id: &str, kind: &str) {
    push(tx, json!({
        "type": "response.output_item.added",
        "event_id": "evt_oi",
        "response_id": response_id,
        "output_index": index,
        "item": {"id": item_id, "type": kind, "role": "assistant"},
    }));
}

fn content_part_added(tx: &Inbound, response_id: &str, item_id: &str, index: u32) {
    push(tx, json!({
        "type": "response.content_part.added",
        "event_id": "evt_cp",
        "response_id": response_id,
        "item_id": item_id,
        "output_index": 0,
        "content_index": index,
        "part": {"type": "audio"},
    }));
}

fn audio_delta(tx: &Inbound, response_id: &str, item_id: &str, payload: &[u8]) {
    push(tx, json!({
        "type": "response.audio.delta",
        "event_id": "evt_ad",
        "response_id": response_id,
        "item_id": item_id,
        "output_index": 0,
        "content_index": 0,
        "delta": b64(payload),
    }));
}

// ── Tests ───────────────────────────────────────────────────────────────

#[test]
fn test_builder_validation() {
    assert!(matches!(
        ProtocolClient::builder().build(),
        Err(BridgeError::Config(_))
    ));
    assert!(matches!(
        ProtocolClient::builder().options(ClientOptions::new("", "test-model")).build(),
        Err(BridgeError::Config(_))
    ));
    assert!(matches!(
        ProtocolClient::builder().options(ClientOptions::new("key", "")).build(),
        Err(BridgeError::Config(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_connect_sends_handshake_once_and_runs() {
    let (transport, handles) = scripted(1);
    let client = build_client(transport);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Running);
    assert!(client.is_connected());

    let (conn, _tx) = &handles[0];
    let updates = conn.sent_of_type("session.update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["session"]["voice"], "alloy");
    assert_eq!(updates[0]["session"]["modalities"], json!(["text", "audio"]));

    // Connecting twice without a close in between is a caller error.
    assert!(client.connect().await.is_err());
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_send_audio_requires_connection() {
    let (transport, _handles) = scripted(1);
    let client = build_client(transport);
    let err = client.send_audio_chunk(&[0u8; 320]).await.unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn test_audio_delta_reaches_pacer_and_ledger() {
    let (transport, handles) = scripted(1);
    let client = build_client(transport);
    client.connect().await.unwrap();
    let (_conn, tx) = &handles[0];

    response_created(tx, "resp_1");
    output_item_added(tx, "resp_1", 0, "item_1", "message");
    content_part_added(tx, "resp_1", "item_1", 0);
    // 480 samples of PCM16.
    audio_delta(tx, "resp_1", "item_1", &[1u8; 960]);

    let pacer = client.pacer();
    assert!(wait_until(|| pacer.buffered_samples() == 480).await);

    let response = client.response("resp_1").expect("tracked response");
    assert_eq!(response.outputs.len(), 1);
    assert_eq!(response.outputs[0].contents[0].audio.len(), 1);
    assert!(response.first_token_at.is_some());
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_misaligned_audio_delta_dropped_without_fallout() {
    let (transport, handles) = scripted(1);
    let client = build_client(transport);
    client.connect().await.unwrap();
    let (_conn, tx) = &handles[0];

    response_created(tx, "resp_1");
    output_item_added(tx, "resp_1", 0, "item_1", "message");
    content_part_added(tx, "resp_1", "item_1", 0);

    // Odd byte count cannot be PCM16: dropped, nothing queued.
    audio_delta(tx, "resp_1", "item_1", &[1u8; 959]);
    // A well-formed delta right after still goes through.
    audio_delta(tx, "resp_1", "item_1", &[2u8; 960]);

    let pacer = client.pacer();
    assert!(wait_until(|| pacer.buffered_samples() == 480).await);
    let response = client.response("resp_1").unwrap();
    assert_eq!(response.outputs[0].contents[0].audio.len(), 1);
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_protocol_violation_dropped_without_fallout() {
    let (transport, handles) = scripted(1);
    let client = build_client(transport);
    client.connect().await.unwrap();
    let (_conn, tx) = &handles[0];

    response_created(tx, "resp_1");
    // References output 0 before any output exists: dropped.
    content_part_added(tx, "resp_1", "item_1", 0);
    // Dispatch survives and the legitimate sequence still applies.
    output_item_added(tx, "resp_1", 0, "item_1", "message");
    content_part_added(tx, "resp_1", "item_1", 0);

    assert!(
        wait_until(|| {
            client
                .response("resp_1")
                .map(|r| r.outputs.len() == 1 && r.outputs[0].contents.len() == 1)
                .unwrap_or(false)
        })
        .await
    );
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unknown_event_does_not_stall_dispatch() {
    let (transport, handles) = scripted(1);
    let client = build_client(transport);
    client.connect().await.unwrap();
    let (_conn, tx) = &handles[0];

    push(tx, json!({"type": "rate_limits.updated", "event_id": "evt_x", "rate_limits": []}));
    response_created(tx, "resp_1");

    assert!(wait_until(|| client.response("resp_1").is_some()).await);
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_truncates_at_played_milliseconds() {
    let (transport, handles) = scripted(1);
    let client = build_client(transport);
    client.connect().await.unwrap();
    let (conn, tx) = &handles[0];

    // 2.0 s of agent audio; play out 85 frames (1.7 s), leaving 0.3 s queued.
    let pacer = client.pacer();
    pacer.enqueue(&vec![3i16; 48000]);
    for _ in 0..85 {
        pacer.next_frame().await;
    }

    push(tx, json!({
        "type": "input_audio_buffer.speech_started",
        "event_id": "evt_ss",
        "audio_start_ms": 120,
        "item_id": "item_1",
    }));

    assert!(wait_until(|| !conn.sent_of_type("conversation.item.truncate").is_empty()).await);
    let truncate = &conn.sent_of_type("conversation.item.truncate")[0];
    assert_eq!(truncate["item_id"], "item_1");
    assert_eq!(truncate["content_index"], 0);
    // 40800 played samples at 24 kHz.
    assert_eq!(truncate["audio_end_ms"], 1700);

    // Queued playout is discarded so the stale audio is never heard.
    assert_eq!(pacer.buffered_samples(), 0);
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resumes_with_one_handshake_per_connection() {
    let (transport, mut handles) = scripted(2);
    let client = build_client(Arc::clone(&transport));
    client.connect().await.unwrap();

    let (first_conn, first_tx) = handles.remove(0);
    assert_eq!(first_conn.sent_of_type("session.update").len(), 1);

    // Abnormal transport failure: the listener reconnects after the backoff.
    first_tx.send(Err("socket reset".to_string())).unwrap();
    assert!(wait_until(|| transport.connects.load(Ordering::Acquire) == 2).await);
    assert!(wait_until(|| client.state() == ConnectionState::Running).await);

    let (second_conn, second_tx) = handles.remove(0);
    // Exactly one handshake per physical connection, never a duplicate.
    assert!(wait_until(|| second_conn.sent_of_type("session.update").len() == 1).await);
    assert_eq!(first_conn.sent_of_type("session.update").len(), 1);

    // Audio forwarding resumes on the new connection.
    client.send_audio_chunk(&[0u8; 320]).await.unwrap();
    assert_eq!(second_conn.sent_of_type("input_audio_buffer.append").len(), 1);

    // The new connection keeps dispatching events.
    response_created(&second_tx, "resp_after");
    assert!(wait_until(|| client.response("resp_after").is_some()).await);
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_is_also_recovered() {
    let (transport, mut handles) = scripted(2);
    let client = build_client(Arc::clone(&transport));
    client.connect().await.unwrap();

    let (_first_conn, first_tx) = handles.remove(0);
    // Normal close from the peer while the client is running still means the
    // session should come back.
    drop(first_tx);

    assert!(wait_until(|| transport.connects.load(Ordering::Acquire) == 2).await);
    assert!(wait_until(|| client.state() == ConnectionState::Running).await);
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_reconnect_backoff() {
    let (transport, handles) = scripted(2);
    let options = ClientOptions::new("test-key", "test-model")
        .with_reconnect_backoff(Duration::from_secs(3600));
    let client = ProtocolClient::builder()
        .options(options)
        .transport(Arc::clone(&transport) as Arc<dyn voicebridge::Transport>)
        .build()
        .unwrap();
    client.connect().await.unwrap();

    let (_conn, tx) = &handles[0];
    tx.send(Err("socket reset".to_string())).unwrap();
    assert!(wait_until(|| client.state() == ConnectionState::Reconnecting).await);

    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);

    // Even after the full backoff worth of time, no second connect happens.
    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(transport.connects.load(Ordering::Acquire), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_is_terminal() {
    let (transport, _handles) = scripted(1);
    let client = build_client(transport);
    client.connect().await.unwrap();

    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.mixer().is_active());
    assert!(!client.pacer().is_live());
    assert_eq!(client.pending_responses(), 0);

    // Closed is final: no new connection attempts are accepted.
    assert!(matches!(client.connect().await, Err(BridgeError::Closed)));
    // Closing again is harmless.
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tool_call_envelope_round_trip() {
    let (transport, handles) = scripted(1);
    let options = ClientOptions::new("test-key", "test-model");
    let client = ProtocolClient::builder()
        .options(options)
        .transport(transport)
        .tool_handler(FnToolHandler::new(|call| {
            assert_eq!(call.name, "get_weather");
            Ok(ToolOutput::new(json!({"temperature": 72})))
        }))
        .build()
        .unwrap();
    client.connect().await.unwrap();
    let (conn, tx) = &handles[0];

    response_created(tx, "resp_1");
    output_item_added(tx, "resp_1", 0, "item_fc", "function_call");
    push(tx, json!({
        "type": "response.function_call_arguments.done",
        "event_id": "evt_fc",
        "response_id": "resp_1",
        "item_id": "item_fc",
        "output_index": 0,
        "call_id": "call_9",
        "name": "get_weather",
        "arguments": "{\"location\":\"NYC\"}",
    }));

    assert!(wait_until(|| !conn.sent_of_type("conversation.item.create").is_empty()).await);
    let created = &conn.sent_of_type("conversation.item.create")[0];
    assert_eq!(created["item"]["type"], "function_call_output");
    assert_eq!(created["item"]["call_id"], "call_9");

    // end_of_turn output asks the model to respond right away, after the
    // tool output item.
    assert!(wait_until(|| !conn.sent_of_type("response.create").is_empty()).await);
    let types = conn.sent_types();
    let item_pos = types.iter().position(|t| t == "conversation.item.create").unwrap();
    let response_pos = types.iter().position(|t| t == "response.create").unwrap();
    assert!(item_pos < response_pos);

    // The call is also recorded on the ledger for inspection.
    let response = client.response("resp_1").unwrap();
    assert_eq!(response.outputs[0].contents[0].tool_calls[0].call_id, "call_9");
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_server_error_routed_to_handler() {
    #[derive(Clone, Default)]
    struct RecordingHandler {
        errors: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn on_error(&self, error: &BridgeError) -> voicebridge::Result<()> {
            self.errors.lock().unwrap().push(error.to_string());
            Ok(())
        }
    }

    let handler = RecordingHandler::default();
    let recorded = Arc::clone(&handler.errors);

    let (transport, handles) = scripted(1);
    let client = ProtocolClient::builder()
        .options(ClientOptions::new("test-key", "test-model"))
        .transport(transport)
        .event_handler(handler)
        .build()
        .unwrap();
    client.connect().await.unwrap();
    let (_conn, tx) = &handles[0];

    push(tx, json!({
        "type": "error",
        "event_id": "evt_e",
        "error": {"type": "server_error", "code": "overloaded", "message": "try later"},
    }));

    assert!(
        wait_until(|| recorded.lock().unwrap().iter().any(|e| e.contains("overloaded"))).await
    );
    // A protocol-level error never tears the transport down.
    assert_eq!(client.state(), ConnectionState::Running);
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_room_audio_drains_upstream() {
    struct ChannelSource {
        rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<AudioFrame>>,
    }

    #[async_trait]
    impl MediaSource for ChannelSource {
        fn id(&self) -> &str {
            "alice"
        }

        fn kind(&self) -> TrackKind {
            TrackKind::Audio
        }

        async fn next_frame(&self) -> Option<AudioFrame> {
            self.rx.lock().await.recv().await
        }
    }

    let (transport, handles) = scripted(1);
    let client = build_client(transport);
    client.connect().await.unwrap();
    let (conn, _tx) = &handles[0];

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    client
        .mixer()
        .add_source(Arc::new(ChannelSource { rx: tokio::sync::Mutex::new(frame_rx) }))
        .unwrap();

    // One 20 ms frame at 16 kHz goes straight through without resampling.
    frame_tx.send(AudioFrame::new(vec![250i16; 320], 16000, 1)).unwrap();

    assert!(wait_until(|| !conn.sent_of_type("input_audio_buffer.append").is_empty()).await);
    let append = &conn.sent_of_type("input_audio_buffer.append")[0];
    let audio = base64::engine::general_purpose::STANDARD
        .decode(append["audio"].as_str().unwrap())
        .unwrap();
    assert_eq!(audio.len(), 640);
    client.close().await.unwrap();
}
