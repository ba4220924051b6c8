//! The broadcast hub.
//!
//! The hub is a single task that owns the subscriber set and the history
//! window. Every operation travels through one command queue and is applied
//! in arrival order, so subscribe, unsubscribe, and publish never interleave.
//! [`Hub`] is the cloneable handle used to reach it.

use crate::event::{Event, Timestamp};
use crate::history::{History, DEFAULT_HISTORY_CAPACITY};
use crate::subscription::{Inbox, SubscriberId, Subscription};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace};

/// Default per-subscriber inbox capacity.
pub const DEFAULT_INBOX_CAPACITY: usize = 10;

/// Default hub command queue capacity.
pub const DEFAULT_COMMAND_CAPACITY: usize = 10;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub task has stopped.
    #[error("Hub is no longer running")]
    Closed,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Number of recent events replayed to new subscribers.
    pub history_capacity: usize,
    /// Events buffered per subscriber before the oldest are dropped.
    ///
    /// The queue may round this up to the next power of two.
    pub inbox_capacity: usize,
    /// Commands buffered before callers wait on the hub.
    pub command_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Number of active subscribers.
    pub subscriber_count: usize,
    /// Number of events in the history window.
    pub history_len: usize,
    /// Events published since the hub started.
    pub published_total: u64,
}

enum Command {
    Subscribe(oneshot::Sender<Subscription>),
    Unsubscribe(SubscriberId),
    Publish(Event),
    Stats(oneshot::Sender<HubStats>),
}

/// Handle to the broadcast hub.
///
/// Cloning is cheap; every clone talks to the same hub task. The task stops
/// once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
}

impl Hub {
    /// Start a hub with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn() -> Self {
        Self::spawn_with_config(HubConfig::default())
    }

    /// Start a hub with custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn_with_config(config: HubConfig) -> Self {
        info!("Starting hub with config: {:?}", config);
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let worker = HubWorker::new(&config);
        tokio::spawn(worker.run(receiver));
        Self { commands }
    }

    /// Register a new subscriber.
    ///
    /// The returned history holds every event in the window when the hub
    /// processed this call; the inbox receives every later event.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn subscribe(&self) -> Result<Subscription, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Subscribe(reply)).await?;
        response.await.map_err(|_| HubError::Closed)
    }

    /// Remove a subscriber. Unknown ids are ignored.
    ///
    /// Events already queued for the subscriber stay readable; its inbox
    /// then reports end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<(), HubError> {
        self.send(Command::Unsubscribe(id)).await
    }

    /// Record an event in the history window and deliver it to every
    /// subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn publish(&self, event: Event) -> Result<(), HubError> {
        self.send(Command::Publish(event)).await
    }

    /// Publish a join event for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn join(&self, user: impl Into<String>) -> Result<(), HubError> {
        self.publish(Event::join(user)).await
    }

    /// Publish a leave event for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn leave(&self, user: impl Into<String>) -> Result<(), HubError> {
        self.publish(Event::leave(user)).await
    }

    /// Publish a message event.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn say(
        &self,
        user: impl Into<String>,
        timestamp: Timestamp,
        text: impl Into<String>,
    ) -> Result<(), HubError> {
        self.publish(Event::message(user, timestamp, text)).await
    }

    /// Get hub statistics.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stats(reply)).await?;
        response.await.map_err(|_| HubError::Closed)
    }

    async fn send(&self, command: Command) -> Result<(), HubError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::Closed)
    }
}

/// State owned by the hub task.
struct HubWorker {
    recent: History,
    subscribers: HashMap<SubscriberId, broadcast::Sender<Arc<Event>>>,
    next_id: SubscriberId,
    inbox_capacity: usize,
    published_total: u64,
}

impl HubWorker {
    fn new(config: &HubConfig) -> Self {
        Self {
            recent: History::with_capacity(config.history_capacity),
            subscribers: HashMap::new(),
            next_id: 1,
            inbox_capacity: config.inbox_capacity.max(1),
            published_total: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!("Hub worker started");

        while let Some(command) = commands.recv().await {
            self.handle(command);
        }

        debug!(
            subscribers = self.subscribers.len(),
            published = self.published_total,
            "Hub worker stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe(reply) => {
                let subscription = self.subscribe();
                if let Err(subscription) = reply.send(subscription) {
                    // Caller gave up before the reply arrived.
                    self.unsubscribe(subscription.id());
                }
            }
            Command::Unsubscribe(id) => {
                self.unsubscribe(id);
            }
            Command::Publish(event) => {
                self.publish(event);
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn subscribe(&mut self) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;

        let (sender, receiver) = broadcast::channel(self.inbox_capacity);
        self.subscribers.insert(id, sender);

        debug!(
            subscriber = id,
            subscribers = self.subscribers.len(),
            history = self.recent.len(),
            "Subscribed"
        );

        Subscription {
            history: self.recent.snapshot(),
            inbox: Inbox::new(id, receiver),
        }
    }

    /// Returns `true` if the subscriber was registered.
    fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(
                subscriber = id,
                subscribers = self.subscribers.len(),
                "Unsubscribed"
            );
        } else {
            trace!(subscriber = id, "Unsubscribe for unknown subscriber ignored");
        }
        removed
    }

    /// Returns the number of subscribers the event was queued for.
    fn publish(&mut self, event: Event) -> usize {
        let event = Arc::new(event);

        if let Some(evicted) = self.recent.push(Arc::clone(&event)) {
            trace!(evicted = %evicted, "Evicted from history");
        }
        self.published_total += 1;

        let mut recipients = 0;
        self.subscribers
            .retain(|id, sender| match sender.send(Arc::clone(&event)) {
                Ok(_) => {
                    recipients += 1;
                    true
                }
                Err(_) => {
                    debug!(subscriber = *id, "Pruning subscriber with dropped inbox");
                    false
                }
            });

        trace!(event = %event, recipients, "Published");
        recipients
    }

    fn stats(&self) -> HubStats {
        HubStats {
            subscriber_count: self.subscribers.len(),
            history_len: self.recent.len(),
            published_total: self.published_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use std::time::Duration;

    fn texts(events: &[Arc<Event>]) -> Vec<String> {
        events.iter().map(|e| e.text().to_string()).collect()
    }

    fn drain(subscription: &mut Subscription) -> Vec<Arc<Event>> {
        let mut events = Vec::new();
        while let Some(event) = subscription.inbox.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_worker_history_is_last_five() {
        let mut worker = HubWorker::new(&HubConfig::default());

        for i in 1..=7 {
            worker.publish(Event::message("alice", i, format!("m{i}")));
        }

        let subscription = worker.subscribe();
        assert_eq!(
            texts(&subscription.history),
            vec!["m3", "m4", "m5", "m6", "m7"]
        );
    }

    #[test]
    fn test_worker_history_shorter_than_window() {
        let mut worker = HubWorker::new(&HubConfig::default());
        assert!(worker.subscribe().history.is_empty());

        worker.publish(Event::message("alice", 1, "m1"));
        worker.publish(Event::message("alice", 2, "m2"));
        assert_eq!(texts(&worker.subscribe().history), vec!["m1", "m2"]);
    }

    #[test]
    fn test_worker_history_never_exceeds_capacity() {
        let mut worker = HubWorker::new(&HubConfig::default());
        for i in 0..50 {
            worker.publish(Event::message("alice", i, i.to_string()));
            assert!(worker.stats().history_len <= DEFAULT_HISTORY_CAPACITY);
        }
        assert_eq!(worker.stats().published_total, 50);
    }

    #[test]
    fn test_worker_unsubscribe_is_idempotent() {
        let mut worker = HubWorker::new(&HubConfig::default());
        let mut first = worker.subscribe();
        let mut second = worker.subscribe();

        assert!(worker.unsubscribe(first.id()));
        assert!(!worker.unsubscribe(first.id()));
        assert!(!worker.unsubscribe(9_999));

        assert_eq!(worker.publish(Event::join("bob")), 1);
        assert!(first.inbox.try_recv().is_none());
        assert_eq!(second.inbox.try_recv().unwrap().user(), "bob");
    }

    #[test]
    fn test_worker_ids_are_unique() {
        let mut worker = HubWorker::new(&HubConfig::default());
        let a = worker.subscribe();
        let b = worker.subscribe();
        worker.unsubscribe(a.id());
        let c = worker.subscribe();

        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_ne!(b.id(), c.id());
        assert_eq!(worker.stats().subscriber_count, 2);
    }

    #[test]
    fn test_worker_prunes_dropped_inbox() {
        let mut worker = HubWorker::new(&HubConfig::default());
        let gone = worker.subscribe();
        let _kept = worker.subscribe();
        drop(gone);

        assert_eq!(worker.publish(Event::join("alice")), 1);
        assert_eq!(worker.stats().subscriber_count, 1);
    }

    #[tokio::test]
    async fn test_subscribe_publish_unsubscribe_scenario() {
        let hub = Hub::spawn();
        let mut subscription = hub.subscribe().await.unwrap();

        hub.join("alice").await.unwrap();
        hub.say("alice", 100, "hi").await.unwrap();
        hub.unsubscribe(subscription.id()).await.unwrap();
        hub.leave("alice").await.unwrap();

        let mut live = Vec::new();
        while let Some(event) = subscription.inbox.recv().await {
            live.push(event);
        }

        let kinds: Vec<EventKind> = live.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::Join, EventKind::Message]);
        assert_eq!(live[1].text(), "hi");

        // The leave was still recorded for future subscribers.
        let late = hub.subscribe().await.unwrap();
        assert_eq!(late.history.len(), 3);
        assert_eq!(late.history[2].kind(), EventKind::Leave);
    }

    #[tokio::test]
    async fn test_two_subscribers_receive_identical_event() {
        let hub = Hub::spawn();
        let mut s1 = hub.subscribe().await.unwrap();
        let mut s2 = hub.subscribe().await.unwrap();

        hub.say("alice", 1, "hello").await.unwrap();

        let e1 = s1.inbox.recv().await.unwrap();
        let e2 = s2.inbox.recv().await.unwrap();
        assert_eq!(*e1, *e2);

        // Exactly one each.
        hub.stats().await.unwrap();
        assert!(drain(&mut s1).is_empty());
        assert!(drain(&mut s2).is_empty());
    }

    #[tokio::test]
    async fn test_seven_messages_then_subscribe() {
        let hub = Hub::spawn();
        for i in 1..=7 {
            hub.say("alice", i, format!("m{i}")).await.unwrap();
        }

        let subscription = hub.subscribe().await.unwrap();
        assert_eq!(
            texts(&subscription.history),
            vec!["m3", "m4", "m5", "m6", "m7"]
        );
    }

    #[tokio::test]
    async fn test_double_unsubscribe_does_not_affect_others() {
        let hub = Hub::spawn();
        let gone = hub.subscribe().await.unwrap();
        let mut kept = hub.subscribe().await.unwrap();
        let id = gone.id();

        gone.cancel(&hub).await;
        hub.unsubscribe(id).await.unwrap();
        hub.unsubscribe(424_242).await.unwrap();

        hub.join("bob").await.unwrap();
        assert_eq!(kept.inbox.recv().await.unwrap().user(), "bob");
        assert_eq!(hub.stats().await.unwrap().subscriber_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_drains_queued_events() {
        let hub = Hub::spawn();
        let subscription = hub.subscribe().await.unwrap();

        hub.join("alice").await.unwrap();
        hub.join("bob").await.unwrap();
        hub.stats().await.unwrap();

        assert_eq!(subscription.cancel(&hub).await, 2);
        assert_eq!(hub.stats().await.unwrap().subscriber_count, 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_without_stalling_others() {
        let hub = Hub::spawn_with_config(HubConfig {
            inbox_capacity: 4,
            ..HubConfig::default()
        });
        let mut slow = hub.subscribe().await.unwrap();
        let mut fast = hub.subscribe().await.unwrap();

        let fast_seen = tokio::time::timeout(Duration::from_secs(5), async {
            let mut seen = Vec::new();
            for i in 0..100 {
                hub.say("alice", i, "x").await.unwrap();
                hub.stats().await.unwrap();
                seen.push(fast.inbox.try_recv().unwrap().timestamp());
            }
            seen
        })
        .await
        .expect("publisher stalled on a full inbox");

        assert_eq!(fast_seen, (0..100).collect::<Vec<_>>());
        assert_eq!(fast.inbox.dropped(), 0);

        let slow_seen: Vec<Timestamp> = drain(&mut slow).iter().map(|e| e.timestamp()).collect();
        assert_eq!(slow_seen, vec![96, 97, 98, 99]);
        assert_eq!(slow.inbox.dropped(), 96);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_same_order_everywhere() {
        const SUBSCRIBERS: usize = 8;
        const PRODUCERS: i64 = 4;
        const PER_PRODUCER: i64 = 50;
        const TOTAL: usize = (PRODUCERS * PER_PRODUCER) as usize;

        let hub = Hub::spawn_with_config(HubConfig {
            inbox_capacity: TOTAL,
            ..HubConfig::default()
        });

        let mut readers = Vec::new();
        for _ in 0..SUBSCRIBERS {
            let mut subscription = hub.subscribe().await.unwrap();
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::with_capacity(TOTAL);
                while seen.len() < TOTAL {
                    let event = subscription.inbox.recv().await.unwrap();
                    seen.push((event.user().to_string(), event.timestamp()));
                }
                (seen, subscription.inbox.dropped())
            }));
        }

        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let hub = hub.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..PER_PRODUCER {
                    hub.say(format!("p{p}"), i, "x").await.unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        let mut sequences = Vec::new();
        for reader in readers {
            let (seen, dropped) = tokio::time::timeout(Duration::from_secs(10), reader)
                .await
                .expect("subscriber did not receive every event")
                .unwrap();
            assert_eq!(dropped, 0);
            assert_eq!(seen.len(), TOTAL);
            sequences.push(seen);
        }

        for sequence in &sequences[1..] {
            assert_eq!(sequence, &sequences[0]);
        }

        // Each producer's events keep their send order.
        for p in 0..PRODUCERS {
            let user = format!("p{p}");
            let own: Vec<i64> = sequences[0]
                .iter()
                .filter(|(u, _)| *u == user)
                .map(|(_, ts)| *ts)
                .collect();
            assert_eq!(own, (0..PER_PRODUCER).collect::<Vec<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_during_publish_sees_each_event_once() {
        const ROUNDS: usize = 20;
        const SUBSCRIBERS: usize = 10;
        const PUBLISHES: i64 = 40;

        for _ in 0..ROUNDS {
            let hub = Hub::spawn_with_config(HubConfig {
                inbox_capacity: PUBLISHES as usize,
                ..HubConfig::default()
            });

            let producer = {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for i in 0..PUBLISHES {
                        hub.say("alice", i, "x").await.unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            };

            let mut readers = Vec::new();
            for _ in 0..SUBSCRIBERS {
                let hub = hub.clone();
                readers.push(tokio::spawn(async move {
                    let mut subscription = hub.subscribe().await.unwrap();
                    let mut seen: Vec<i64> =
                        subscription.history.iter().map(|e| e.timestamp()).collect();
                    while seen.last() != Some(&(PUBLISHES - 1)) {
                        let event = subscription.inbox.recv().await.unwrap();
                        seen.push(event.timestamp());
                    }
                    seen
                }));
            }

            producer.await.unwrap();
            for reader in readers {
                let seen = tokio::time::timeout(Duration::from_secs(5), reader)
                    .await
                    .expect("subscriber never saw the last event")
                    .unwrap();
                let first = seen[0];
                assert_eq!(seen, (first..PUBLISHES).collect::<Vec<_>>());
            }
        }
    }

    #[tokio::test]
    async fn test_hub_closed_after_worker_stops() {
        let (commands, receiver) = mpsc::channel(1);
        drop(receiver);
        let hub = Hub { commands };

        assert!(matches!(hub.join("alice").await, Err(HubError::Closed)));
        assert!(matches!(hub.subscribe().await, Err(HubError::Closed)));
    }
}
