//! WebSocket transport implementation.
//!
//! Wraps an upgraded axum [`WebSocket`]. Frames travel as text messages;
//! binary messages are accepted if they hold UTF-8 JSON.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_protocol::{ClientFrame, FrameCodec, ServerFrame, MAX_FRAME_SIZE};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

use crate::traits::{Connection, ConnectionId, FrameSink, FrameStream, TransportError};

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_FRAME_SIZE,
        }
    }
}

/// A WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    codec: FrameCodec,
}

impl WebSocketConnection {
    /// Wrap an upgraded WebSocket.
    #[must_use]
    pub fn new(socket: WebSocket, remote_addr: Option<SocketAddr>, config: &WebSocketConfig) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
            remote_addr,
            codec: FrameCodec::with_max_frame_size(config.max_message_size),
        }
    }
}

impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        let this = *self;
        let (sink, stream) = this.socket.split();
        (
            Box::new(WebSocketSink {
                id: this.id.clone(),
                sink,
                open: true,
            }),
            Box::new(WebSocketStream {
                id: this.id,
                stream,
                codec: this.codec,
            }),
        )
    }
}

/// Outbound half of a WebSocket connection.
pub struct WebSocketSink {
    id: ConnectionId,
    sink: SplitSink<WebSocket, Message>,
    open: bool,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::ConnectionClosed);
        }

        let text = parley_protocol::encode(frame)?;
        trace!(connection = %self.id, event = frame.event_name(), "Sending frame");
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.open, false) {
            return Ok(()); // Already closed
        }

        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}

/// Inbound half of a WebSocket connection.
pub struct WebSocketStream {
    id: ConnectionId,
    stream: SplitStream<WebSocket>,
    codec: FrameCodec,
}

#[async_trait]
impl FrameStream for WebSocketStream {
    async fn recv(&mut self) -> Result<Option<ClientFrame>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return self.codec.decode(&text).map(Some).map_err(Into::into);
                }
                Some(Ok(Message::Binary(data))) => {
                    return self
                        .codec
                        .decode_binary(&data)
                        .map(Some)
                        .map_err(Into::into);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are answered by the WebSocket layer
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
