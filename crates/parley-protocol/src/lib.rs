//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat relay.
//!
//! Clients and server exchange JSON text frames of the form
//! `{"event": <name>, "data": <payload>}`.
//!
//! ## Frame Types
//!
//! - `join` (client) - Announce a username
//! - `chat` (client) - Post a message `{User, Timestamp, Message}`
//! - `chat` (server) - Deliver an event `{EvtType, User, Timestamp, Text}`
//! - `error` (server) - Report a rejected frame
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientFrame};
//!
//! let frame = codec::decode(r#"{"event":"join","data":"alice"}"#).unwrap();
//! assert_eq!(frame, ClientFrame::join("alice"));
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, FrameCodec, ProtocolError, MAX_FRAME_SIZE};
pub use frames::{
    error_codes, ChatMessage, ClientFrame, ErrorPayload, EventPayload, EventType, ServerFrame,
};
