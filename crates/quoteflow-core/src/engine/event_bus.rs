//! Broadcast channel for workflow events.
//!
//! Every subscriber receives every event published after it subscribed.
//! Publishing never blocks; slow subscribers lag and lose old events.

use quoteflow_types::WorkflowEvent;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed; callers usually ignore that.
	pub fn publish(
		&self,
		event: WorkflowEvent,
	) -> Result<(), broadcast::error::SendError<WorkflowEvent>> {
		self.sender.send(event).map(|_| ())
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use quoteflow_types::OrderEvent;

	#[tokio::test]
	async fn test_subscribers_receive_published_events() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		let event = WorkflowEvent::Order(OrderEvent::Placed { order_id: 1 });
		bus.publish(event.clone()).unwrap();

		assert_eq!(first.recv().await.unwrap(), event);
		assert_eq!(second.recv().await.unwrap(), event);
	}

	#[test]
	fn test_publish_without_subscribers_is_an_error() {
		let bus = EventBus::default();
		assert!(bus
			.publish(WorkflowEvent::Order(OrderEvent::Completed { order_id: 1 }))
			.is_err());
	}
}
