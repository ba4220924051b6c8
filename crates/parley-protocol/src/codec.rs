//! Codec for encoding and decoding Parley frames.
//!
//! Frames are JSON text. Decoding goes through an untyped envelope first so
//! that unknown events can be told apart from malformed ones.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::frames::{error_codes, ChatMessage, ClientFrame, ServerFrame};

/// Default maximum frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },

    /// Frame is not a JSON envelope.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Binary frame that is not UTF-8.
    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Envelope names an event this server does not handle.
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Envelope is fine but its data does not fit the event.
    #[error("Invalid {event} payload: {reason}")]
    InvalidPayload {
        /// Event name.
        event: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(serde_json::Error),
}

impl ProtocolError {
    /// Error code to report back to the client, or `None` if the error
    /// should be ignored silently.
    #[must_use]
    pub fn client_code(&self) -> Option<u16> {
        match self {
            ProtocolError::FrameTooLarge { .. } => Some(error_codes::FRAME_TOO_LARGE),
            ProtocolError::Malformed(_) | ProtocolError::InvalidUtf8(_) => {
                Some(error_codes::MALFORMED_FRAME)
            }
            ProtocolError::InvalidPayload { .. } => Some(error_codes::INVALID_PAYLOAD),
            ProtocolError::UnknownEvent(_) | ProtocolError::Encode(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Encode a server frame to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(frame: &ServerFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(ProtocolError::Encode)
}

/// Encode a client frame to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_client(frame: &ClientFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(ProtocolError::Encode)
}

/// Decode a client frame using the default size limit.
///
/// # Errors
///
/// Returns an error if the frame is too large, malformed, or unknown.
pub fn decode(text: &str) -> Result<ClientFrame, ProtocolError> {
    decode_with_limit(text, MAX_FRAME_SIZE)
}

/// Decode a client frame, rejecting anything longer than `max` bytes.
///
/// The `chat` payload may be either an object or a string holding the
/// JSON-encoded object.
///
/// # Errors
///
/// Returns an error if the frame is too large, malformed, or unknown.
pub fn decode_with_limit(text: &str, max: usize) -> Result<ClientFrame, ProtocolError> {
    if text.len() > max {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max,
        });
    }

    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.event.as_str() {
        "join" => match envelope.data {
            Value::String(user) if !user.trim().is_empty() => Ok(ClientFrame::Join(user)),
            Value::String(_) => Err(ProtocolError::InvalidPayload {
                event: "join",
                reason: "username must not be empty".to_string(),
            }),
            other => Err(ProtocolError::InvalidPayload {
                event: "join",
                reason: format!("expected a username string, got {}", json_kind(&other)),
            }),
        },
        "chat" => {
            let message: Result<ChatMessage, _> = match envelope.data {
                Value::String(encoded) => serde_json::from_str(&encoded),
                other => serde_json::from_value(other),
            };
            message
                .map(ClientFrame::Chat)
                .map_err(|e| ProtocolError::InvalidPayload {
                    event: "chat",
                    reason: e.to_string(),
                })
        }
        _ => Err(ProtocolError::UnknownEvent(envelope.event)),
    }
}

/// Decode a server frame. Used by clients.
///
/// # Errors
///
/// Returns an error if the text is not a valid server frame.
pub fn decode_server(text: &str) -> Result<ServerFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Frame codec with a configurable size limit.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl FrameCodec {
    /// Create a new codec with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec that rejects frames larger than `max_frame_size` bytes.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the size limit.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a server frame.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, frame: &ServerFrame) -> Result<String, ProtocolError> {
        encode(frame)
    }

    /// Decode a client text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode(&self, text: &str) -> Result<ClientFrame, ProtocolError> {
        decode_with_limit(text, self.max_frame_size)
    }

    /// Decode a client binary frame, which must hold UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or decoding fails.
    pub fn decode_binary(&self, data: &[u8]) -> Result<ClientFrame, ProtocolError> {
        if data.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: data.len(),
                max: self.max_frame_size,
            });
        }
        self.decode(std::str::from_utf8(data)?)
    }
}
