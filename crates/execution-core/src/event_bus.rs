//! Fire-and-forget event fan-out.

use crate::events::ConnectorEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel of [`ConnectorEvent`]s.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a subscriber that falls more than `capacity` events behind
/// observes `RecvError::Lagged` on its next receive.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConnectorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns a receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, returning how many subscribers will see it.
    pub fn publish(&self, event: ConnectorEvent) -> usize {
        debug!(
            event = event.name(),
            client_order_id = %event.client_order_id(),
            "Publishing event"
        );
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OrderCancelledEvent;

    fn cancelled(id: &str) -> ConnectorEvent {
        ConnectorEvent::OrderCancelled(OrderCancelledEvent {
            timestamp: 1,
            client_order_id: id.into(),
            exchange_order_id: None,
            trading_pair: "BTC-USDT".into(),
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(cancelled("a")), 0);
    }

    #[tokio::test]
    async fn test_fan_out() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(cancelled("a")), 2);

        assert_eq!(rx1.recv().await.unwrap().client_order_id(), "a");
        assert_eq!(rx2.recv().await.unwrap().client_order_id(), "a");
    }

    #[test]
    fn test_clone_shares_channel() {
        let bus = EventBus::new(8);
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.publish(cancelled("b"));
        assert_eq!(rx.try_recv().unwrap().name(), "OrderCancelled");
    }
}
