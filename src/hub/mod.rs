//! Broadcast Hub
//!
//! Fan-out of update and stats messages to WebSocket subscribers. The
//! subscriber set is owned by a single event-loop task; callers reach it
//! only through channels, so no external lock is ever taken.

mod messages;

pub use messages::{
    ClusterInfoMessage, ClusterStatsMessage, CommandMessage, NodeStats, SyncMessage,
    UpdateMessage,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

pub type SubscriberId = u64;

enum HubEvent {
    Register {
        id: SubscriberId,
        sender: mpsc::UnboundedSender<String>,
    },
    Unregister {
        id: SubscriberId,
    },
    Broadcast {
        payload: String,
    },
}

/// Handle for enqueueing hub operations.
///
/// Cheap to clone; all handles feed the same event loop. Queues are
/// unbounded, so enqueueing never blocks the command path; a subscriber
/// that stops draining costs memory until its connection unregisters it.
#[derive(Clone)]
pub struct Hub {
    events: mpsc::UnboundedSender<HubEvent>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    /// Create the hub and spawn its event loop
    pub fn spawn() -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        tokio::spawn(run_event_loop(inbox));

        Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to broadcasts.
    ///
    /// Returns the subscriber id and the stream of serialized payloads.
    pub fn register(&self) -> (SubscriberId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.send(HubEvent::Register { id, sender });
        (id, receiver)
    }

    /// Drop a subscriber from the fan-out set
    pub fn unregister(&self, id: SubscriberId) {
        self.send(HubEvent::Unregister { id });
    }

    /// Serialize and enqueue a store-change notification.
    ///
    /// Payloads are JSON, so key and value bytes are rendered as UTF-8
    /// with replacement characters for anything else.
    pub fn broadcast_update(&self, action: &str, key: &[u8], value: Option<&[u8]>) {
        let msg = UpdateMessage {
            action: action.to_string(),
            key: String::from_utf8_lossy(key).into_owned(),
            value: value.map(|v| String::from_utf8_lossy(v).into_owned()),
        };

        match serde_json::to_string(&msg) {
            Ok(payload) => self.send(HubEvent::Broadcast { payload }),
            Err(err) => error!(%err, "failed to serialize update message"),
        }
    }

    /// Serialize and enqueue a cluster-stats snapshot
    pub fn broadcast_cluster_stats(&self, stats: &ClusterStatsMessage) {
        match serde_json::to_string(stats) {
            Ok(payload) => self.send(HubEvent::Broadcast { payload }),
            Err(err) => error!(%err, "failed to serialize cluster stats"),
        }
    }

    fn send(&self, event: HubEvent) {
        // The event loop runs for the process lifetime; a closed channel
        // only happens during shutdown, where dropping the event is fine.
        let _ = self.events.send(event);
    }
}

async fn run_event_loop(mut inbox: mpsc::UnboundedReceiver<HubEvent>) {
    let mut subscribers: HashMap<SubscriberId, mpsc::UnboundedSender<String>> = HashMap::new();

    while let Some(event) = inbox.recv().await {
        match event {
            HubEvent::Register { id, sender } => {
                subscribers.insert(id, sender);
                debug!(id, "subscriber registered");
            }
            HubEvent::Unregister { id } => {
                subscribers.remove(&id);
                debug!(id, "subscriber unregistered");
            }
            HubEvent::Broadcast { payload } => {
                for (id, sender) in &subscribers {
                    // Best-effort fan-out: one closed subscriber never
                    // blocks delivery to the others.
                    if sender.send(payload.clone()).is_err() {
                        debug!(id, "dropped broadcast to closed subscriber");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("hub closed the subscription")
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let hub = Hub::spawn();
        let (_a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        hub.broadcast_update("set", b"k", Some(&b"v"[..]));

        let payload = recv(&mut rx_a).await;
        assert_eq!(payload, r#"{"action":"set","key":"k","value":"v"}"#);
        assert_eq!(recv(&mut rx_b).await, payload);
    }

    #[tokio::test]
    async fn test_unregistered_subscriber_stops_receiving() {
        let hub = Hub::spawn();
        let (id_a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        hub.unregister(id_a);
        hub.broadcast_update("del", b"k", None);

        // The remaining subscriber still gets the message
        assert_eq!(recv(&mut rx_b).await, r#"{"action":"del","key":"k"}"#);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_subscriber_does_not_block_others() {
        let hub = Hub::spawn();
        let (_a, rx_a) = hub.register();
        drop(rx_a);
        let (_b, mut rx_b) = hub.register();

        hub.broadcast_update("set", b"x", Some(&b"1"[..]));
        assert_eq!(
            recv(&mut rx_b).await,
            r#"{"action":"set","key":"x","value":"1"}"#
        );
    }
}
