//! Transport abstraction traits for Parley.
//!
//! A [`Connection`] splits into a [`FrameSink`] and a [`FrameStream`] so a
//! session can wait on inbound frames while it writes outbound ones.

use async_trait::async_trait;
use parley_protocol::{ClientFrame, ProtocolError, ServerFrame};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the connection is still usable after this error.
    ///
    /// A bad frame only costs that frame; anything else ends the connection.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Protocol(_))
    }

    /// Error code to report back to the client, if any.
    #[must_use]
    pub fn client_code(&self) -> Option<u16> {
        match self {
            TransportError::Protocol(e) => e.client_code(),
            _ => None,
        }
    }
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a frame to the client.
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next frame from the client.
    ///
    /// Returns `Ok(None)` if the connection is closed cleanly. A frame that
    /// fails to decode yields a recoverable [`TransportError::Protocol`].
    async fn recv(&mut self) -> Result<Option<ClientFrame>, TransportError>;
}

/// An accepted client connection.
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Split into independently usable outbound and inbound halves.
    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameStream>);
}
