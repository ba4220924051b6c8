//! # parley-core
//!
//! Event model and broadcast hub for the Parley chat relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Event** - Immutable join/leave/message record
//! - **History** - Bounded window of recent events for late joiners
//! - **Hub** - Serialized coordinator owning subscribers and history
//! - **Subscription** - History snapshot plus a live, drop-oldest inbox
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ publish  ┌─────────────┐  fan-out  ┌─────────────┐
//! │  Session    │─────────▶│  Hub task   │──────────▶│   Inbox     │ (one per session)
//! └─────────────┘          └─────────────┘           └─────────────┘
//!                                 │
//!                                 ▼
//!                          ┌─────────────┐
//!                          │   History   │
//!                          └─────────────┘
//! ```

pub mod event;
pub mod history;
pub mod hub;
pub mod subscription;

pub use event::{unix_now, Event, EventKind, Timestamp};
pub use history::{History, DEFAULT_HISTORY_CAPACITY};
pub use hub::{Hub, HubConfig, HubError, HubStats, DEFAULT_COMMAND_CAPACITY, DEFAULT_INBOX_CAPACITY};
pub use subscription::{Inbox, SubscriberId, Subscription};
