//! Service realization executor.
//!
//! Marks the service as performed and hands over to realization
//! validation. It runs again each time the client refuses the realization.

use super::{StageError, StageOutcome};
use crate::engine::event_bus::EventBus;
use crate::state::{OrderStateError, OrderStateMachine};
use quoteflow_types::{OrderId, Stage, StageEvent, StageFlag, WorkflowEvent};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::instrument;

pub struct RealizationHandler {
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
	work_permits: Arc<Semaphore>,
}

impl RealizationHandler {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
		work_permits: Arc<Semaphore>,
	) -> Self {
		Self {
			state_machine,
			event_bus,
			work_permits,
		}
	}

	/// Performs the service of one order.
	#[instrument(skip_all, fields(order_id = order_id))]
	pub async fn realize(&self, order_id: OrderId) -> Result<StageOutcome, StageError> {
		let _permit = self
			.work_permits
			.acquire()
			.await
			.map_err(|e| StageError::Permit(e.to_string()))?;

		let order = match self
			.state_machine
			.transition_flag_with(order_id, StageFlag::ServiceRealization, true, |o| {
				o.realization_attempts += 1;
			})
			.await
		{
			Ok(order) => order,
			Err(OrderStateError::OrderNotFound(_)) => {
				tracing::info!("Order no longer exists, stopping");
				return Ok(StageOutcome::Vanished);
			},
			Err(e) => return Err(e.into()),
		};

		tracing::info!(attempt = order.realization_attempts, "Service performed");
		self.event_bus
			.publish(WorkflowEvent::Stage(StageEvent::Approved {
				order_id,
				stage: Stage::ServiceRealization,
			}))
			.ok();

		Ok(StageOutcome::Schedule(Stage::RealizationValidation))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use quoteflow_storage::implementations::memory::MemoryStorage;
	use quoteflow_storage::StorageService;
	use quoteflow_types::Order;

	fn handler() -> (RealizationHandler, Arc<OrderStateMachine>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = Arc::new(OrderStateMachine::new(storage));
		(
			RealizationHandler::new(
				machine.clone(),
				EventBus::default(),
				Arc::new(Semaphore::new(1)),
			),
			machine,
		)
	}

	#[tokio::test]
	async fn test_realize_counts_attempts() {
		let (handler, machine) = handler();
		let mut order = Order::new(1, "A", "a@x.com", 0);
		order.flags.validated = true;
		order.flags.validated_quote_supplier = true;
		order.flags.validated_quote_client = true;
		machine.store_order(&order).await.unwrap();

		assert_eq!(
			handler.realize(1).await.unwrap(),
			StageOutcome::Schedule(Stage::RealizationValidation)
		);
		machine
			.transition_flag(1, StageFlag::ServiceRealization, false)
			.await
			.unwrap();
		handler.realize(1).await.unwrap();

		let stored = machine.get_order(1).await.unwrap();
		assert!(stored.flags.service_realization);
		assert_eq!(stored.realization_attempts, 2);
	}

	#[tokio::test]
	async fn test_realize_requires_accepted_quote() {
		let (handler, machine) = handler();
		machine
			.store_order(&Order::new(1, "A", "a@x.com", 0))
			.await
			.unwrap();

		assert!(matches!(
			handler.realize(1).await,
			Err(StageError::State(_))
		));
	}

	#[tokio::test]
	async fn test_realize_missing_order_stops_quietly() {
		let (handler, _) = handler();
		assert_eq!(handler.realize(9).await.unwrap(), StageOutcome::Vanished);
	}
}
