//! Subscriptions and per-subscriber inboxes.
//!
//! Each subscriber gets its own bounded ring. The hub never waits on it:
//! when a ring is full the oldest undelivered event is overwritten and the
//! inbox counts the loss the next time it is read.

use crate::event::Event;
use crate::hub::Hub;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

/// Handle identifying a subscriber to the hub.
pub type SubscriberId = u64;

/// Receiving side of one subscriber's event queue.
#[derive(Debug)]
pub struct Inbox {
    id: SubscriberId,
    receiver: broadcast::Receiver<Arc<Event>>,
    dropped: u64,
}

impl Inbox {
    pub(crate) fn new(id: SubscriberId, receiver: broadcast::Receiver<Arc<Event>>) -> Self {
        Self {
            id,
            receiver,
            dropped: 0,
        }
    }

    /// Get the subscriber id this inbox belongs to.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Number of events lost because this inbox fell behind.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the hub has removed this subscriber and every
    /// event queued before the removal has been read.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Unsubscribe and drain whatever is still queued.
    ///
    /// Returns the number of events discarded while draining.
    pub async fn cancel(mut self, hub: &Hub) -> usize {
        if hub.unsubscribe(self.id).await.is_err() {
            debug!(subscriber = self.id, "Hub already stopped, draining inbox");
        }

        let mut drained = 0;
        while self.recv().await.is_some() {
            drained += 1;
        }

        debug!(
            subscriber = self.id,
            drained,
            dropped = self.dropped,
            "Subscription cancelled"
        );
        drained
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        warn!(
            subscriber = self.id,
            skipped,
            total_dropped = self.dropped,
            "Subscriber fell behind, oldest events dropped"
        );
    }
}

/// A registered interest in live events plus the history at registration.
#[derive(Debug)]
pub struct Subscription {
    /// Events in the history window when the subscription was made,
    /// oldest first.
    pub history: Vec<Arc<Event>>,
    /// Live events published after the subscription was made.
    pub inbox: Inbox,
}

impl Subscription {
    /// Get the subscriber id.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.inbox.id()
    }

    /// Unsubscribe and drain the inbox.
    ///
    /// Returns the number of events discarded while draining.
    pub async fn cancel(self, hub: &Hub) -> usize {
        self.inbox.cancel(hub).await
    }
}
