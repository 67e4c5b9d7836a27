//! Broker implementation

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

use super::Publisher;

/// A message published to a destination
///
/// Cheap to clone: both fields are reference counted.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Destination the message was published to
    pub destination: Arc<str>,
    /// Opaque message body
    pub body: Bytes,
}

/// Topic broker keyed by destination
pub struct Broker {
    /// Map of destination to its fan-out channel
    topics: DashMap<String, broadcast::Sender<Delivery>>,

    /// Per-destination buffer; subscribers lagging further than this skip ahead
    capacity: usize,
}

impl Broker {
    /// Create a broker with the given per-destination buffer size
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a destination, creating it if needed
    pub fn subscribe(&self, destination: &str) -> broadcast::Receiver<Delivery> {
        let capacity = self.capacity;
        let rx = self
            .topics
            .entry(destination.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        tracing::trace!(destination = destination, "Subscription added");
        rx
    }

    /// Number of live subscriptions on a destination
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.topics
            .get(destination)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of destinations currently known to the broker
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Drop destinations whose subscribers have all gone away
    ///
    /// Returns the number of destinations removed.
    pub fn prune(&self) -> usize {
        let before = self.topics.len();
        self.topics.retain(|_, tx| tx.receiver_count() > 0);
        let removed = before.saturating_sub(self.topics.len());

        if removed > 0 {
            tracing::debug!(removed = removed, "Pruned idle destinations");
        }
        removed
    }

    /// Spawn a task that prunes idle destinations every `interval`
    ///
    /// A zero interval is raised to one millisecond.
    pub fn spawn_prune_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(self);
        let interval = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                broker.prune();
            }
        })
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Publisher for Broker {
    fn publish(&self, destination: &str, body: Bytes) -> usize {
        let sent = match self.topics.get(destination) {
            Some(tx) => tx
                .send(Delivery {
                    destination: Arc::from(destination),
                    body,
                })
                .ok(),
            None => Some(0),
        };

        match sent {
            Some(n) => n,
            None => {
                // Every receiver is gone; forget the destination.
                self.topics
                    .remove_if(destination, |_, tx| tx.receiver_count() == 0);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let broker = Broker::default();

        assert_eq!(broker.publish("/topic/call/nobody", Bytes::from_static(b"{}")), 0);
        assert_eq!(broker.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let broker = Broker::default();
        let mut rx1 = broker.subscribe("/topic/peers");
        let mut rx2 = broker.subscribe("/topic/peers");
        let mut other = broker.subscribe("/topic/channels");

        let reached = broker.publish("/topic/peers", Bytes::from_static(b"{\"a\":{}}"));
        assert_eq!(reached, 2);

        let d1 = rx1.recv().await.unwrap();
        let d2 = rx2.recv().await.unwrap();
        assert_eq!(&*d1.destination, "/topic/peers");
        assert_eq!(d1.body, d2.body);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_task_accepts_zero_interval() {
        let broker = Arc::new(Broker::default());

        let handle = broker.spawn_prune_task(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.is_finished());
        handle.abort();
    }

    #[test]
    fn test_dropped_subscribers_are_forgotten() {
        let broker = Broker::default();
        let rx = broker.subscribe("/topic/message/a");
        assert_eq!(broker.subscriber_count("/topic/message/a"), 1);

        drop(rx);
        assert_eq!(broker.publish("/topic/message/a", Bytes::from_static(b"hi")), 0);
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn test_prune() {
        let broker = Broker::default();
        let _keep = broker.subscribe("/topic/peers");
        drop(broker.subscribe("/topic/call/x"));

        assert_eq!(broker.prune(), 1);
        assert_eq!(broker.topic_count(), 1);
        assert_eq!(broker.subscriber_count("/topic/peers"), 1);
    }
}
