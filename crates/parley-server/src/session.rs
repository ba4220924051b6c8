//! Per-connection session.
//!
//! A session subscribes to the hub, replays recent history to its client,
//! then relays in both directions until the client leaves, the transport
//! fails, or the server shuts down. On the way out it publishes a leave
//! event for the joined user and cancels its subscription.

use crate::metrics::{self, ConnectionMetricsGuard};
use crate::shutdown::ShutdownController;
use parley_core::{unix_now, Event, Hub, HubError, Subscription};
use parley_protocol::{ClientFrame, ServerFrame};
use parley_transport::{Connection, ConnectionId, FrameSink, TransportError};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the connection.
    ClientClosed,
    /// Reading from the client failed.
    TransportError,
    /// Writing to the client failed.
    SendFailed,
    /// The server is shutting down.
    Shutdown,
    /// The hub stopped.
    HubStopped,
}

struct Session {
    id: ConnectionId,
    hub: Hub,
    user: Option<String>,
}

impl Session {
    async fn handle_frame(&mut self, frame: ClientFrame) -> Result<(), HubError> {
        match frame {
            ClientFrame::Join(user) => {
                match self.user.replace(user.clone()) {
                    Some(previous) if previous != user => {
                        debug!(connection = %self.id, previous = %previous, user = %user, "Rejoined under new name");
                        self.hub.leave(previous).await?;
                        metrics::record_event_published("leave");
                    }
                    _ => {}
                }
                info!(connection = %self.id, user = %user, "User joined");
                self.hub.join(user).await?;
                metrics::record_event_published("join");
            }
            ClientFrame::Chat(message) => {
                let user = if message.user.is_empty() {
                    self.user.clone().unwrap_or_default()
                } else {
                    message.user
                };
                let timestamp = if message.timestamp > 0 {
                    message.timestamp
                } else {
                    unix_now()
                };
                trace!(connection = %self.id, user = %user, "Chat message");
                self.hub.publish(Event::message(user, timestamp, message.message)).await?;
                metrics::record_event_published("message");
            }
        }
        Ok(())
    }
}

/// Drive one client connection to completion.
pub async fn run_session(
    conn: Box<dyn Connection>,
    hub: Hub,
    shutdown: ShutdownController,
) -> CloseReason {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let id = conn.id().clone();
    debug!(connection = %id, remote = ?conn.remote_addr(), "Client connected");

    let (mut sink, mut stream) = conn.split();

    let Subscription { history, mut inbox } = match hub.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!(connection = %id, error = %e, "Failed to subscribe");
            metrics::record_error("hub");
            let _ = sink.close().await;
            return CloseReason::HubStopped;
        }
    };
    update_subscriber_gauge(&hub).await;

    let mut session = Session {
        id: id.clone(),
        hub: hub.clone(),
        user: None,
    };
    let mut dropped_seen = 0;

    let mut reason = None;
    for event in &history {
        if send(&mut *sink, &id, &event.to_frame()).await.is_err() {
            reason = Some(CloseReason::SendFailed);
            break;
        }
    }

    let reason = match reason {
        Some(reason) => reason,
        None => loop {
            tokio::select! {
                () = shutdown.wait_for_shutdown() => break CloseReason::Shutdown,

                event = inbox.recv() => {
                    record_dropped(inbox.dropped(), &mut dropped_seen);
                    let Some(event) = event else {
                        break CloseReason::HubStopped;
                    };
                    if send(&mut *sink, &id, &event.to_frame()).await.is_err() {
                        break CloseReason::SendFailed;
                    }
                }

                frame = stream.recv() => match frame {
                    Ok(Some(frame)) => {
                        let start = Instant::now();
                        metrics::record_frame("inbound");
                        if let Err(e) = session.handle_frame(frame).await {
                            error!(connection = %id, error = %e, "Failed to publish");
                            metrics::record_error("hub");
                            break CloseReason::HubStopped;
                        }
                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Ok(None) => break CloseReason::ClientClosed,
                    Err(e) if e.is_recoverable() => {
                        metrics::record_frame("inbound");
                        let Some(code) = e.client_code() else {
                            debug!(connection = %id, error = %e, "Ignoring frame");
                            continue;
                        };
                        warn!(connection = %id, error = %e, "Rejected frame");
                        metrics::record_error("protocol");
                        if send(&mut *sink, &id, &ServerFrame::error(code, e.to_string())).await.is_err() {
                            break CloseReason::SendFailed;
                        }
                    }
                    Err(e) => {
                        warn!(connection = %id, error = %e, "Receive failed");
                        metrics::record_error("transport");
                        break CloseReason::TransportError;
                    }
                },
            }
        },
    };

    if let Some(user) = session.user.take() {
        info!(connection = %id, user = %user, "User left");
        match hub.leave(user).await {
            Ok(()) => metrics::record_event_published("leave"),
            Err(e) => warn!(connection = %id, error = %e, "Failed to publish leave"),
        }
    }

    let dropped = inbox.dropped();
    let discarded = inbox.cancel(&hub).await;
    record_dropped(dropped, &mut dropped_seen);
    update_subscriber_gauge(&hub).await;

    if let Err(e) = sink.close().await {
        debug!(connection = %id, error = %e, "Close failed");
    }

    debug!(
        connection = %id,
        reason = ?reason,
        dropped,
        discarded,
        "Client disconnected"
    );
    reason
}

async fn send(
    sink: &mut dyn FrameSink,
    id: &ConnectionId,
    frame: &ServerFrame,
) -> Result<(), TransportError> {
    match sink.send(frame).await {
        Ok(()) => {
            metrics::record_frame("outbound");
            Ok(())
        }
        Err(e) => {
            debug!(connection = %id, error = %e, "Send failed");
            metrics::record_error("send");
            Err(e)
        }
    }
}

fn record_dropped(total: u64, seen: &mut u64) {
    metrics::record_events_dropped(total.saturating_sub(*seen));
    *seen = total;
}

async fn update_subscriber_gauge(hub: &Hub) {
    if let Ok(stats) = hub.stats().await {
        metrics::set_active_subscribers(stats.subscriber_count);
    }
}
