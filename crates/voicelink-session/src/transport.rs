use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use voicelink_core::SessionError;

/// One duplex wire frame. Text frames carry provider control envelopes,
/// binary frames carry raw audio bytes; the two are never mixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// A persistent duplex connection. The session state machine only sees this
/// seam, so provider sockets and in-process test pipes are interchangeable.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), SessionError>;

    /// The next inbound frame, `None` once the peer has closed.
    async fn next(&mut self) -> Option<Result<Frame, SessionError>>;

    async fn close(&mut self);
}

// ── WsTransport ───────────────────────────────────────────────

pub struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let (inner, _response) = connect_async(url)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        tracing::debug!("websocket connected");
        Ok(Self { inner })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), SessionError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))
    }

    async fn next(&mut self) -> Option<Result<Frame, SessionError>> {
        while let Some(item) = self.inner.next().await {
            match item {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                // Control frames are handled by the protocol layer
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(SessionError::Connection(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

// ── ChannelTransport ──────────────────────────────────────────

use tokio::sync::mpsc;

/// In-process transport backed by a channel pair. Stands in for a provider
/// socket in tests and local simulations: the handle side observes what the
/// session sends and injects inbound frames.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<Result<Frame, SessionError>>,
    closed: bool,
}

pub struct ChannelHandle {
    /// Frames the session wrote to the wire.
    pub sent: mpsc::UnboundedReceiver<Frame>,
    /// Inject inbound frames as if the provider had sent them.
    pub inject: mpsc::UnboundedSender<Result<Frame, SessionError>>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, ChannelHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: outbound_tx,
                inbound: inbound_rx,
                closed: false,
            },
            ChannelHandle {
                sent: outbound_rx,
                inject: inbound_tx,
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Connection("transport closed".to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| SessionError::Connection("peer gone".to_string()))
    }

    async fn next(&mut self) -> Option<Result<Frame, SessionError>> {
        if self.closed {
            return None;
        }
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
