//! # WebSocket Transport
//!
//! The dialing seam between the channel manager and the network.
//!
//! ## Seam Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Transport Seam                                   │
//! │                                                                         │
//! │   ChannelManager ──► Transport::connect(url) ──► Connection             │
//! │                                                  ├── FrameSink          │
//! │                                                  │   (write text,       │
//! │                                                  │    close)            │
//! │                                                  └── FrameSource        │
//! │                                                      (read ConnEvents)  │
//! │                                                                         │
//! │  The two halves let the manager await inbound events while still       │
//! │  being able to write, tokio::select! style.                            │
//! │                                                                         │
//! │  WS MESSAGE ──► ConnEvent MAPPING                                      │
//! │  ────────────────────────────────                                      │
//! │  Text             ──► Frame(json)                                      │
//! │  Close / closed   ──► Closed { clean: true }   (authoritative)         │
//! │  stream ended     ──► Closed { clean: false }  (authoritative)         │
//! │  socket error     ──► Error(..)                (advisory only)         │
//! │  Ping/Pong/Binary ──► swallowed (protocol plumbing, logged)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `Closed` may drive connection-state transitions; `Error` events are
//! surfaced for status and logs but the socket is not considered gone until
//! its stream says so.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connection Events
// =============================================================================

/// What a live connection can report back to the channel manager.
#[derive(Debug)]
pub enum ConnEvent {
    /// A text frame arrived.
    Frame(String),

    /// The socket reported an error. Advisory: the connection may still
    /// deliver frames or a close afterwards.
    Error(SyncError),

    /// The connection is gone. `clean` distinguishes a close handshake from
    /// a dropped socket; either way this is the signal state machines act on.
    Closed { clean: bool },
}

// =============================================================================
// Transport Traits
// =============================================================================

/// Dials a sync endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `url`, completing once the handshake is done.
    async fn connect(&self, url: &Url) -> SyncResult<Connection>;
}

/// Write half of a live connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Writes one text frame. `Ok` means the frame reached the socket, which
    /// is the signal the outbox relies on before dropping an event.
    async fn send(&mut self, text: String) -> SyncResult<()>;

    /// Closes the connection, best effort.
    async fn close(&mut self);
}

/// Read half of a live connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next event. After `Closed` has been returned, keeps returning it.
    async fn next(&mut self) -> ConnEvent;
}

/// A freshly opened connection, already split for select-loop use.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

// =============================================================================
// Tungstenite Transport
// =============================================================================

/// Type alias for the underlying socket.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        WsTransport { connect_timeout }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url) -> SyncResult<Connection> {
        let connect_future = connect_async(url.as_str());

        let ws_stream = match timeout(self.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                ws_stream
            }
            Ok(Err(e)) => return Err(SyncError::from(e)),
            Err(_) => return Err(SyncError::Timeout(self.connect_timeout.as_secs())),
        };

        let (sink, stream) = ws_stream.split();
        Ok(Connection {
            sink: Box::new(WsFrameSink { sink }),
            source: Box::new(WsFrameSource {
                stream,
                closed: None,
            }),
        })
    }
}

struct WsFrameSink {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, text: String) -> SyncResult<()> {
        self.sink
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(SyncError::from)
    }

    async fn close(&mut self) {
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

struct WsFrameSource {
    stream: SplitStream<WsStream>,
    /// Set once the stream has ended, with the clean flag to replay.
    closed: Option<bool>,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn next(&mut self) -> ConnEvent {
        if let Some(clean) = self.closed {
            return ConnEvent::Closed { clean };
        }

        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return ConnEvent::Frame(text.to_string());
                }
                Some(Ok(WsMessage::Ping(_))) => {
                    // tungstenite queues the protocol-level pong itself.
                    debug!("Received WS ping");
                }
                Some(Ok(WsMessage::Pong(_))) => {
                    debug!("Received WS pong");
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "Received close frame");
                    self.closed = Some(true);
                    return ConnEvent::Closed { clean: true };
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    warn!("Received unexpected binary message");
                }
                Some(Ok(WsMessage::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    self.closed = Some(true);
                    return ConnEvent::Closed { clean: true };
                }
                Some(Err(e)) => {
                    return ConnEvent::Error(SyncError::from(e));
                }
                None => {
                    self.closed = Some(false);
                    return ConnEvent::Closed { clean: false };
                }
            }
        }
    }
}
