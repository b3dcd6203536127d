use tokio::sync::broadcast;

use super::{ChangeEvent, Collection, EventMask, Subscription};

/// Fan-out of row changes to every open subscription.
pub struct ChangeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self, collection: Collection, mask: EventMask) -> Subscription {
        tracing::debug!("Subscribing to changes on {}", collection);
        Subscription::new(collection, mask, self.sender.subscribe())
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.send(event);
    }

    /// Open subscriptions across all collections.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(256)
    }
}
