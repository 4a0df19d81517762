//! Handler for stages gated by the approval oracle.
//!
//! Every gated stage follows the same loop: wait for the settle delay,
//! run the stage executor if there is one, then consult the oracle until it
//! gives a definitive answer. The order is re-read before each consultation
//! so that a concurrent removal ends the run quietly.
//!
//! A work permit is held only around storage and quote work. Waiting for
//! the oracle or for a delay holds none, so parked decisions never starve
//! other orders.

use super::{StageError, StageOutcome};
use crate::engine::event_bus::EventBus;
use crate::state::{OrderStateError, OrderStateMachine};
use quoteflow_config::EngineConfig;
use quoteflow_oracle::OracleService;
use quoteflow_quote::{GeneratedQuote, QuoteGenerator};
use quoteflow_types::{
	Decision, DecisionRequest, Order, OrderEvent, OrderId, Stage, StageEvent, StageFlag,
	WorkflowEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::instrument;

/// Pacing of the decision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
	/// Wait before the first consultation.
	pub settle_delay: Duration,
	/// Wait between an indeterminate answer and the next consultation.
	pub poll_interval: Duration,
	/// Consecutive indeterminate answers tolerated before auto-rejecting.
	pub indeterminate_retry_limit: Option<u32>,
}

impl From<&EngineConfig> for StageTiming {
	fn from(config: &EngineConfig) -> Self {
		Self {
			settle_delay: config.settle_delay(),
			poll_interval: config.poll_interval(),
			indeterminate_retry_limit: config.indeterminate_retry_limit,
		}
	}
}

pub struct StageHandler {
	oracle: Arc<OracleService>,
	quotes: Arc<QuoteGenerator>,
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
	timing: StageTiming,
	work_permits: Arc<Semaphore>,
}

impl StageHandler {
	pub fn new(
		oracle: Arc<OracleService>,
		quotes: Arc<QuoteGenerator>,
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
		timing: StageTiming,
		work_permits: Arc<Semaphore>,
	) -> Self {
		Self {
			oracle,
			quotes,
			state_machine,
			event_bus,
			timing,
			work_permits,
		}
	}

	async fn work_permit(&self) -> Result<SemaphorePermit<'_>, StageError> {
		self.work_permits
			.acquire()
			.await
			.map_err(|e| StageError::Permit(e.to_string()))
	}

	/// Runs one gated stage of one order to its outcome.
	#[instrument(skip_all, fields(order_id = order_id, stage = %stage))]
	pub async fn handle(&self, order_id: OrderId, stage: Stage) -> Result<StageOutcome, StageError> {
		if !stage.requires_decision() {
			return Err(StageError::Unsupported(stage));
		}

		tokio::time::sleep(self.timing.settle_delay).await;

		let quote = {
			let _permit = self.work_permit().await?;
			let Some(order) = self.load_ready(order_id, stage).await? else {
				return Ok(StageOutcome::Vanished);
			};
			match stage {
				Stage::QuoteSupplierValidation => Some(self.generate_quote(&order).await?),
				_ => None,
			}
		};

		let mut indeterminate = 0u32;
		loop {
			let order = {
				let _permit = self.work_permit().await?;
				let Some(order) = self.load_ready(order_id, stage).await? else {
					return Ok(StageOutcome::Vanished);
				};
				order
			};

			let request = DecisionRequest {
				order_id,
				stage,
				name: order.name.clone(),
				email: order.email.clone(),
				quote_file_name: quote
					.as_ref()
					.map(|q| q.file_name.clone())
					.or_else(|| order.quote_file_name.clone()),
			};

			let decision = self
				.oracle
				.decide(&request)
				.await
				.map_err(|e| StageError::Oracle(e.to_string()))?;

			match decision {
				Decision::Approve => {
					let _permit = self.work_permit().await?;
					return self.approve(&order, stage, quote.as_ref()).await;
				},
				Decision::Reject => {
					let _permit = self.work_permit().await?;
					return self.reject(&order, stage).await;
				},
				Decision::Indeterminate => {
					indeterminate += 1;
					self.event_bus
						.publish(WorkflowEvent::Stage(StageEvent::Indeterminate {
							order_id,
							stage,
							attempt: indeterminate,
						}))
						.ok();

					if let Some(limit) = self.timing.indeterminate_retry_limit {
						if indeterminate > limit {
							tracing::warn!(
								attempts = indeterminate,
								"No definitive decision, rejecting"
							);
							let _permit = self.work_permit().await?;
							return self.reject(&order, stage).await;
						}
					}

					tracing::info!(attempt = indeterminate, "Indeterminate decision, polling again");
					tokio::time::sleep(self.timing.poll_interval).await;
				},
			}
		}
	}

	/// Re-reads the order and checks that earlier stages completed.
	///
	/// Returns `None` when the order no longer exists.
	async fn load_ready(
		&self,
		order_id: OrderId,
		stage: Stage,
	) -> Result<Option<Order>, StageError> {
		let Some(order) = self.state_machine.find_order(order_id).await? else {
			tracing::info!("Order no longer exists, stopping");
			return Ok(None);
		};

		if let Some(missing) = stage
			.required_flags()
			.iter()
			.find(|flag| !order.flags.get(**flag))
		{
			return Err(StageError::PreconditionFailed {
				order_id,
				stage,
				missing: *missing,
			});
		}

		Ok(Some(order))
	}

	async fn generate_quote(&self, order: &Order) -> Result<GeneratedQuote, StageError> {
		let quote = self
			.quotes
			.generate(order.id, &order.name, &order.email)
			.await
			.map_err(|e| StageError::Quote(e.to_string()))?;

		self.event_bus
			.publish(WorkflowEvent::Stage(StageEvent::QuoteGenerated {
				order_id: order.id,
				file_name: quote.file_name.clone(),
				cost: quote.cost,
			}))
			.ok();
		Ok(quote)
	}

	async fn approve(
		&self,
		order: &Order,
		stage: Stage,
		quote: Option<&GeneratedQuote>,
	) -> Result<StageOutcome, StageError> {
		if let Some(flag) = stage.completion_flag() {
			let file_name = quote.map(|q| q.file_name.clone());
			let result = self
				.state_machine
				.transition_flag_with(order.id, flag, true, |o| {
					if file_name.is_some() {
						o.quote_file_name = file_name;
					}
				})
				.await;

			match result {
				Ok(_) => {},
				Err(OrderStateError::OrderNotFound(_)) => {
					tracing::info!("Order removed before approval was recorded");
					return Ok(StageOutcome::Vanished);
				},
				Err(e) => return Err(e.into()),
			}
		}

		tracing::info!("Approved");
		self.event_bus
			.publish(WorkflowEvent::Stage(StageEvent::Approved {
				order_id: order.id,
				stage,
			}))
			.ok();

		match stage.next() {
			Some(next) => Ok(StageOutcome::Schedule(next)),
			None => {
				tracing::info!("Order completed");
				self.event_bus
					.publish(WorkflowEvent::Order(OrderEvent::Completed { order_id: order.id }))
					.ok();
				Ok(StageOutcome::Completed)
			},
		}
	}

	async fn reject(&self, order: &Order, stage: Stage) -> Result<StageOutcome, StageError> {
		if stage == Stage::RealizationValidation {
			match self
				.state_machine
				.transition_flag(order.id, StageFlag::ServiceRealization, false)
				.await
			{
				Ok(_) => {},
				Err(OrderStateError::OrderNotFound(_)) => return Ok(StageOutcome::Vanished),
				Err(e) => return Err(e.into()),
			}

			tracing::info!(
				attempt = order.realization_attempts,
				"Realization refused, service must be performed again"
			);
			self.event_bus
				.publish(WorkflowEvent::Stage(StageEvent::RealizationReset {
					order_id: order.id,
					attempt: order.realization_attempts,
				}))
				.ok();
			return Ok(StageOutcome::Schedule(Stage::ServiceRealization));
		}

		self.state_machine.reject_order(order.id, stage).await?;

		tracing::info!("Rejected, order removed");
		self.event_bus
			.publish(WorkflowEvent::Order(OrderEvent::Rejected {
				order_id: order.id,
				stage,
			}))
			.ok();
		Ok(StageOutcome::Rejected)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::ScriptedOracle;
	use quoteflow_quote::FixedPricing;
	use quoteflow_storage::implementations::memory::MemoryStorage;
	use quoteflow_storage::StorageService;
	use tempfile::TempDir;

	struct Fixture {
		handler: StageHandler,
		machine: Arc<OrderStateMachine>,
		oracle: ScriptedOracle,
		_quotes_dir: TempDir,
	}

	fn fixture(fallback: Decision, quotes_dir: TempDir) -> Fixture {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = Arc::new(OrderStateMachine::new(storage));
		let oracle = ScriptedOracle::new(fallback);
		let handler = StageHandler::new(
			Arc::new(OracleService::new(Box::new(oracle.clone()), None)),
			Arc::new(QuoteGenerator::new(
				quotes_dir.path(),
				Box::new(FixedPricing(125)),
			)),
			machine.clone(),
			EventBus::default(),
			StageTiming {
				settle_delay: Duration::from_secs(5),
				poll_interval: Duration::from_secs(1),
				indeterminate_retry_limit: None,
			},
			Arc::new(Semaphore::new(1)),
		);
		Fixture {
			handler,
			machine,
			oracle,
			_quotes_dir: quotes_dir,
		}
	}

	async fn store(machine: &OrderStateMachine, flags: &[StageFlag]) {
		let mut order = Order::new(1, "A", "a@x.com", 0);
		for flag in flags {
			order.flags.set(*flag, true);
		}
		machine.store_order(&order).await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_supplier_approval_records_quote_file() {
		let f = fixture(Decision::Approve, TempDir::new().unwrap());
		store(&f.machine, &[StageFlag::Validated]).await;

		let outcome = f
			.handler
			.handle(1, Stage::QuoteSupplierValidation)
			.await
			.unwrap();
		assert_eq!(
			outcome,
			StageOutcome::Schedule(Stage::QuoteClientEvaluation)
		);

		let order = f.machine.get_order(1).await.unwrap();
		assert!(order.flags.validated_quote_supplier);
		assert_eq!(order.quote_file_name.as_deref(), Some("quote_1.txt"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_missing_predecessor_aborts_stage() {
		let f = fixture(Decision::Approve, TempDir::new().unwrap());
		store(&f.machine, &[StageFlag::Validated]).await;

		let err = f
			.handler
			.handle(1, Stage::QuoteClientEvaluation)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			StageError::PreconditionFailed {
				missing: StageFlag::ValidatedQuoteSupplier,
				..
			}
		));
		assert!(f.oracle.calls().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_realization_is_not_a_gated_stage() {
		let f = fixture(Decision::Approve, TempDir::new().unwrap());
		assert!(matches!(
			f.handler.handle(1, Stage::ServiceRealization).await,
			Err(StageError::Unsupported(Stage::ServiceRealization))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_quote_failure_leaves_order_untouched() {
		let quotes_dir = TempDir::new().unwrap();
		let blocker = quotes_dir.path().join("blocked");
		std::fs::write(&blocker, "file, not a directory").unwrap();

		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = Arc::new(OrderStateMachine::new(storage));
		let oracle = ScriptedOracle::new(Decision::Approve);
		let handler = StageHandler::new(
			Arc::new(OracleService::new(Box::new(oracle.clone()), None)),
			Arc::new(QuoteGenerator::new(&blocker, Box::new(FixedPricing(1)))),
			machine.clone(),
			EventBus::default(),
			StageTiming {
				settle_delay: Duration::ZERO,
				poll_interval: Duration::from_secs(1),
				indeterminate_retry_limit: None,
			},
			Arc::new(Semaphore::new(1)),
		);
		store(&machine, &[StageFlag::Validated]).await;

		assert!(matches!(
			handler.handle(1, Stage::QuoteSupplierValidation).await,
			Err(StageError::Quote(_))
		));
		let order = machine.get_order(1).await.unwrap();
		assert!(!order.flags.validated_quote_supplier);
		assert!(order.quote_file_name.is_none());
		assert!(oracle.calls().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_realization_refusal_resets_flag() {
		let f = fixture(Decision::Reject, TempDir::new().unwrap());
		store(
			&f.machine,
			&[
				StageFlag::Validated,
				StageFlag::ValidatedQuoteSupplier,
				StageFlag::ValidatedQuoteClient,
				StageFlag::ServiceRealization,
			],
		)
		.await;

		let outcome = f
			.handler
			.handle(1, Stage::RealizationValidation)
			.await
			.unwrap();
		assert_eq!(outcome, StageOutcome::Schedule(Stage::ServiceRealization));

		let order = f.machine.get_order(1).await.unwrap();
		assert!(!order.flags.service_realization);
		assert!(order.flags.validated_quote_client);
	}
}
