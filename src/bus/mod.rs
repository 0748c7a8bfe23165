use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::models::event::{DeliveryEvent, Topic};

/// In-process publish/subscribe with named topics.
///
/// Each subscriber gets one unbounded FIFO queue carrying every topic it asked
/// for, so publishing never waits on a slow handler. Every event is also
/// mirrored onto a lossy broadcast feed for live observers.
pub struct EventBus {
    subscribers: DashMap<Topic, Vec<mpsc::UnboundedSender<DeliveryEvent>>>,
    feed_tx: broadcast::Sender<DeliveryEvent>,
}

impl EventBus {
    pub fn new(feed_buffer_size: usize) -> Self {
        let (feed_tx, _unused_rx) = broadcast::channel(feed_buffer_size.max(1));

        Self {
            subscribers: DashMap::new(),
            feed_tx,
        }
    }

    pub fn subscribe(&self, topics: &[Topic]) -> mpsc::UnboundedReceiver<DeliveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for topic in topics {
            self.subscribers.entry(*topic).or_default().push(tx.clone());
        }
        rx
    }

    /// Fire-and-forget. Subscribers whose receiver is gone are dropped.
    pub fn publish(&self, event: DeliveryEvent) {
        let topic = event.topic();

        if let Some(mut senders) = self.subscribers.get_mut(&topic) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
            debug!(topic = %topic, subscribers = senders.len(), "event published");
        }

        let _ = self.feed_tx.send(event);
    }

    pub fn feed(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.feed_tx.subscribe()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .get(&topic)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::EventBus;
    use crate::models::event::{DeliveryEvent, Topic};

    fn pending_trigger(count: usize) -> DeliveryEvent {
        DeliveryEvent::AutoRouteOptimizationTriggered {
            pending_orders: count,
        }
    }

    #[test]
    fn subscriber_receives_only_its_topics_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe(&[Topic::AutoRouteOptimizationTriggered]);

        bus.publish(pending_trigger(1));
        bus.publish(DeliveryEvent::CustomerTrackingRequest {
            delivery_id: Uuid::new_v4(),
            customer_id: "c-1".to_string(),
        });
        bus.publish(pending_trigger(2));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(matches!(
            first,
            DeliveryEvent::AutoRouteOptimizationTriggered { pending_orders: 1 }
        ));
        assert!(matches!(
            second,
            DeliveryEvent::AutoRouteOptimizationTriggered { pending_orders: 2 }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe(&[Topic::AutoRouteOptimizationTriggered]);
        let mut b = bus.subscribe(&[Topic::AutoRouteOptimizationTriggered]);

        bus.publish(pending_trigger(3));

        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn closed_subscribers_are_pruned_on_publish() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe(&[
            Topic::AutoRouteOptimizationTriggered,
            Topic::CustomerTrackingRequest,
        ]);
        assert_eq!(bus.subscriber_count(Topic::AutoRouteOptimizationTriggered), 1);

        drop(rx);
        bus.publish(pending_trigger(0));

        assert_eq!(bus.subscriber_count(Topic::AutoRouteOptimizationTriggered), 0);
        assert_eq!(bus.subscriber_count(Topic::CustomerTrackingRequest), 1);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(16);
        bus.publish(pending_trigger(5));
        assert_eq!(bus.subscriber_count(Topic::AutoRouteOptimizationTriggered), 0);
    }

    #[tokio::test]
    async fn feed_mirrors_published_events() {
        let bus = EventBus::new(16);
        let mut feed = bus.feed();

        bus.publish(pending_trigger(4));

        let event = feed.recv().await.unwrap();
        assert_eq!(event.topic(), Topic::AutoRouteOptimizationTriggered);
    }
}
