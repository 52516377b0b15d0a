//! Broadcast channel for order lifecycle events.

use tokio::sync::broadcast;
use transit_types::TransitEvent;

/// Event bus shared by intake and the scheduler passes.
///
/// Publishing never blocks. Slow subscribers lose the oldest events once
/// `capacity` is exceeded.
pub struct EventBus {
	sender: broadcast::Sender<TransitEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<TransitEvent> {
		self.sender.subscribe()
	}

	/// Publishes to all current subscribers.
	///
	/// Having no subscriber is not an error here; the event is dropped.
	pub fn publish(&self, event: TransitEvent) {
		if self.sender.send(event).is_err() {
			tracing::trace!("event dropped, no subscribers");
		}
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use transit_types::OrderEvent;

	#[tokio::test]
	async fn test_subscribers_receive_events() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		bus.clone().publish(TransitEvent::Order(OrderEvent::Queued {
			order_id: "item".into(),
			transaction_id: "tx".into(),
		}));
		assert_eq!(rx.recv().await.unwrap().order_id(), "item");
	}

	#[test]
	fn test_publish_without_subscribers() {
		EventBus::new(1).publish(TransitEvent::Order(OrderEvent::Queued {
			order_id: "item".into(),
			transaction_id: "tx".into(),
		}));
	}
}
