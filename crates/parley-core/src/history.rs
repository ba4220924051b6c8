//! Bounded window of recent events, replayed to new subscribers.

use crate::event::Event;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of events kept for late joiners.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// FIFO ring of the most recent events.
#[derive(Debug)]
pub struct History {
    events: VecDeque<Arc<Event>>,
    capacity: usize,
}

impl History {
    /// Create a new history window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a history window holding at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event.
    ///
    /// If the window is already full the oldest event is evicted first and
    /// returned.
    pub fn push(&mut self, event: Arc<Event>) -> Option<Arc<Event>> {
        if self.capacity == 0 {
            return Some(event);
        }

        let evicted = if self.events.len() >= self.capacity {
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    /// Copy of the window, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.events.iter().cloned().collect()
    }

    /// Number of events currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
