//! In-memory transport.
//!
//! A [`MemoryConnection`] is driven from the other end by a [`MemoryClient`].
//! Frames are encoded to JSON text and back, exactly as over a socket, so
//! sessions can be exercised without the network.

use async_trait::async_trait;
use parley_protocol::{codec, ClientFrame, FrameCodec, ServerFrame};
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, FrameSink, FrameStream, TransportError};

/// Create a connected server/client pair.
///
/// `buffer` is the number of frames each direction holds before the
/// sending side waits.
#[must_use]
pub fn pair(buffer: usize) -> (MemoryConnection, MemoryClient) {
    let (to_server, from_client) = mpsc::channel(buffer.max(1));
    let (to_client, from_server) = mpsc::channel(buffer.max(1));

    (
        MemoryConnection {
            id: ConnectionId::generate(),
            inbound: from_client,
            outbound: to_client,
            codec: FrameCodec::new(),
        },
        MemoryClient {
            sender: Some(to_server),
            receiver: from_server,
        },
    )
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
    codec: FrameCodec,
}

impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        let this = *self;
        (
            Box::new(MemorySink {
                outbound: Some(this.outbound),
            }),
            Box::new(MemoryStream {
                inbound: this.inbound,
                codec: this.codec,
            }),
        )
    }
}

/// Outbound half of an in-memory connection.
pub struct MemorySink {
    outbound: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        let text = codec::encode(frame)?;
        outbound
            .send(text)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }
}

/// Inbound half of an in-memory connection.
pub struct MemoryStream {
    inbound: mpsc::Receiver<String>,
    codec: FrameCodec,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<ClientFrame>, TransportError> {
        match self.inbound.recv().await {
            Some(text) => self.codec.decode(&text).map(Some).map_err(Into::into),
            None => Ok(None),
        }
    }
}

/// Client side of an in-memory connection.
pub struct MemoryClient {
    sender: Option<mpsc::Sender<String>>,
    receiver: mpsc::Receiver<String>,
}

impl MemoryClient {
    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server side is gone or the client hung up.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), TransportError> {
        let text = codec::encode_client(frame)?;
        self.send_text(text).await
    }

    /// Send raw text, which need not be a valid frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the server side is gone or the client hung up.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        sender
            .send(text.into())
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `Ok(None)` once the server has closed the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server sent something that is not a frame.
    pub async fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError> {
        match self.receiver.recv().await {
            Some(text) => Ok(Some(codec::decode_server(&text)?)),
            None => Ok(None),
        }
    }

    /// Stop sending. The server sees a clean disconnect; frames it already
    /// sent can still be received.
    pub fn hang_up(&mut self) {
        self.sender = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::EventType;

    #[tokio::test]
    async fn test_pair_carries_frames_both_ways() {
        let (conn, mut client) = pair(4);
        let (mut sink, mut stream) = Box::new(conn).split();

        client.send(&ClientFrame::join("alice")).await.unwrap();
        assert_eq!(
            stream.recv().await.unwrap(),
            Some(ClientFrame::join("alice"))
        );

        let frame = ServerFrame::chat(EventType::Join, "alice", 1, "");
        sink.send(&frame).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(frame));
    }

    #[tokio::test]
    async fn test_bad_text_is_recoverable() {
        let (conn, client) = pair(4);
        let (_sink, mut stream) = Box::new(conn).split();

        client.send_text("{oops").await.unwrap();
        client.send(&ClientFrame::join("bob")).await.unwrap();

        let err = stream.recv().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(stream.recv().await.unwrap(), Some(ClientFrame::join("bob")));
    }

    #[tokio::test]
    async fn test_hang_up_and_close() {
        let (conn, mut client) = pair(4);
        let (mut sink, mut stream) = Box::new(conn).split();

        client.hang_up();
        assert!(stream.recv().await.unwrap().is_none());
        assert!(client.send_text("late").await.is_err());

        sink.close().await.unwrap();
        assert!(client.recv().await.unwrap().is_none());
        assert!(matches!(
            sink.send(&ServerFrame::error(1, "x")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
