//! Frame types for the Parley protocol.
//!
//! Every frame travels as a single WebSocket text message holding a JSON
//! envelope of the form `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes carried by [`ServerFrame::Error`].
pub mod error_codes {
    /// The frame was not valid JSON or lacked an `event` field.
    pub const MALFORMED_FRAME: u16 = 4000;
    /// The frame exceeded the maximum accepted size.
    pub const FRAME_TOO_LARGE: u16 = 4001;
    /// The `data` field did not match what the event expects.
    pub const INVALID_PAYLOAD: u16 = 4002;
}

/// Kind of a chat event, as it appears in the `EvtType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A user entered the room.
    Join,
    /// A user left the room.
    Leave,
    /// A user said something.
    Message,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Join => "join",
            EventType::Leave => "leave",
            EventType::Message => "message",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message as submitted by a client.
///
/// Field names are accepted both capitalized and lowercase; browsers in the
/// wild send either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message. May be empty, in which case the server uses
    /// the name announced with `join`.
    #[serde(rename = "User", alias = "user", default)]
    pub user: String,
    /// Client-side timestamp in seconds since the Unix epoch, 0 if unknown.
    #[serde(rename = "Timestamp", alias = "timestamp", default)]
    pub timestamp: i64,
    /// Message text.
    #[serde(rename = "Message", alias = "message")]
    pub message: String,
}

/// A chat event as delivered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// What happened.
    #[serde(rename = "EvtType")]
    pub event_type: EventType,
    /// Who it happened to.
    #[serde(rename = "User")]
    pub user: String,
    /// Seconds since the Unix epoch.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    /// Message text, empty for join and leave.
    #[serde(rename = "Text")]
    pub text: String,
}

/// Error details sent back to a client whose frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable code, see [`error_codes`].
    pub code: u16,
    /// Human-readable description.
    pub message: String,
}

/// A frame sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Announce the username for this connection.
    Join(String),
    /// Post a chat message.
    Chat(ChatMessage),
}

impl ClientFrame {
    /// Create a new Join frame.
    #[must_use]
    pub fn join(user: impl Into<String>) -> Self {
        ClientFrame::Join(user.into())
    }

    /// Create a new Chat frame.
    #[must_use]
    pub fn chat(user: impl Into<String>, timestamp: i64, message: impl Into<String>) -> Self {
        ClientFrame::Chat(ChatMessage {
            user: user.into(),
            timestamp,
            message: message.into(),
        })
    }

    /// Wire name of the frame's event.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientFrame::Join(_) => "join",
            ClientFrame::Chat(_) => "chat",
        }
    }
}

/// A frame sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A chat event, either live or replayed from history.
    Chat(EventPayload),
    /// The previous client frame was rejected.
    Error(ErrorPayload),
}

impl ServerFrame {
    /// Create a new Chat frame.
    #[must_use]
    pub fn chat(
        event_type: EventType,
        user: impl Into<String>,
        timestamp: i64,
        text: impl Into<String>,
    ) -> Self {
        ServerFrame::Chat(EventPayload {
            event_type,
            user: user.into(),
            timestamp,
            text: text.into(),
        })
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerFrame::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    /// Wire name of the frame's event.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerFrame::Chat(_) => "chat",
            ServerFrame::Error(_) => "error",
        }
    }
}

impl From<EventPayload> for ServerFrame {
    fn from(payload: EventPayload) -> Self {
        ServerFrame::Chat(payload)
    }
}
