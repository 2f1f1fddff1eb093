//! Socket transport boundary.
//!
//! The protocol client only needs connect/send/receive of already-framed
//! text messages; [`Transport`] and [`Connection`] capture that boundary so
//! tests can substitute a scripted transport. [`WsTransport`] is the
//! production implementation over tokio-tungstenite.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::error::{BridgeError, Result};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type WsSource = futures::stream::SplitStream<WsStream>;

/// Opens connections to the remote service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and return a live connection.
    async fn connect(&self, url: &Url, headers: &[(String, String)]) -> Result<Arc<dyn Connection>>;
}

/// One established connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Whether the connection is still open.
    fn is_open(&self) -> bool;

    /// Send one UTF-8 text message.
    async fn send(&self, text: &str) -> Result<()>;

    /// Receive the next message.
    ///
    /// Returns `None` on a normal close and `Some(Err(_))` on an abnormal
    /// one, so the listener can tell a clean shutdown from a transport
    /// failure.
    async fn recv(&self) -> Option<Result<String>>;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<()>;
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url, headers: &[(String, String)]) -> Result<Arc<dyn Connection>> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| BridgeError::transport(format!("invalid request: {e}")))?;

        for (name, value) in headers {
            let name: tokio_tungstenite::tungstenite::http::header::HeaderName = name
                .parse()
                .map_err(|e| BridgeError::transport(format!("invalid header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| BridgeError::transport(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| BridgeError::transport(format!("WebSocket connect error: {e}")))?;
        let (sink, source) = stream.split();

        Ok(Arc::new(WsConnection {
            open: AtomicBool::new(true),
            sender: Mutex::new(sink),
            receiver: Mutex::new(source),
        }))
    }
}

/// A WebSocket connection.
pub struct WsConnection {
    open: AtomicBool,
    sender: Mutex<WsSink>,
    receiver: Mutex<WsSource>,
}

#[async_trait]
impl Connection for WsConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(BridgeError::NotConnected);
        }
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| BridgeError::transport(format!("send error: {e}")))
    }

    async fn recv(&self) -> Option<Result<String>> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.into()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        return Some(Err(BridgeError::decode(format!(
                            "invalid UTF-8 in binary message: {e}"
                        ))));
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    // Close frame received: a normal shutdown.
                    self.open.store(false, Ordering::Release);
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.open.store(false, Ordering::Release);
                    return Some(Err(BridgeError::transport(format!("receive error: {e}"))));
                }
                None => {
                    // Stream ended without a close frame.
                    if self.open.swap(false, Ordering::AcqRel) {
                        return Some(Err(BridgeError::transport(
                            "connection closed unexpectedly",
                        )));
                    }
                    return None;
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Close(None))
            .await
            .map_err(|e| BridgeError::transport(format!("close error: {e}")))
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").field("open", &self.is_open()).finish()
    }
}
