//! # parley-transport
//!
//! Transport abstraction layer for the Parley chat relay.
//!
//! This crate provides a unified interface over the ways a client can reach
//! the server:
//!
//! - **WebSocket** - Upgraded axum connections (feature `websocket`)
//! - **Memory** - In-process pairs for tests and benchmarks
//!
//! ## Transport Abstraction
//!
//! Every transport implements [`Connection`], which splits into a
//! [`FrameSink`] and a [`FrameStream`], allowing the server to be
//! protocol-agnostic.
//!
//! ```rust,ignore
//! use parley_transport::Connection;
//!
//! async fn handle_connection(conn: Box<dyn Connection>) {
//!     let (mut sink, mut stream) = conn.split();
//!     while let Ok(Some(frame)) = stream.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryClient, MemoryConnection};
pub use traits::{Connection, ConnectionId, FrameSink, FrameStream, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection};
