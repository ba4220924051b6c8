//! Chat events.
//!
//! An [`Event`] records one thing that happened in the room. Events are
//! immutable once built and are shared between subscribers behind an `Arc`.

use parley_protocol::{EventPayload, EventType, ServerFrame};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// Current wall-clock time in seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

/// What kind of occurrence an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A user entered the room.
    Join,
    /// A user left the room.
    Leave,
    /// A user said something.
    Message,
}

impl From<EventKind> for EventType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Join => EventType::Join,
            EventKind::Leave => EventType::Leave,
            EventKind::Message => EventType::Message,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(EventType::from(*self).as_str())
    }
}

/// A single chat-room occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    user: String,
    timestamp: Timestamp,
    text: String,
}

impl Event {
    /// Create a new event.
    #[must_use]
    pub fn new(
        kind: EventKind,
        user: impl Into<String>,
        timestamp: Timestamp,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            user: user.into(),
            timestamp,
            text: text.into(),
        }
    }

    /// A join event stamped with the current server time.
    #[must_use]
    pub fn join(user: impl Into<String>) -> Self {
        Self::new(EventKind::Join, user, unix_now(), String::new())
    }

    /// A leave event stamped with the current server time.
    #[must_use]
    pub fn leave(user: impl Into<String>) -> Self {
        Self::new(EventKind::Leave, user, unix_now(), String::new())
    }

    /// A message event carrying the caller's timestamp.
    #[must_use]
    pub fn message(user: impl Into<String>, timestamp: Timestamp, text: impl Into<String>) -> Self {
        Self::new(EventKind::Message, user, timestamp, text)
    }

    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Get the acting user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Get the timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Get the message text. Empty for join and leave.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Wire representation of this event.
    #[must_use]
    pub fn to_payload(&self) -> EventPayload {
        EventPayload {
            event_type: self.kind.into(),
            user: self.user.clone(),
            timestamp: self.timestamp,
            text: self.text.clone(),
        }
    }

    /// Outbound `chat` frame carrying this event.
    #[must_use]
    pub fn to_frame(&self) -> ServerFrame {
        self.to_payload().into()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Message => write!(f, "{}:{}:{}", self.kind, self.user, self.text),
            _ => write!(f, "{}:{}", self.kind, self.user),
        }
    }
}
