//! Workflow engine that drives orders through the approval pipeline.
//!
//! Stage runs are queued as jobs on an internal channel. The dispatch loop
//! spawns one task per job and a finished stage queues its successor.
//! Within one order stages therefore never overlap, while different orders
//! progress independently. The handlers share a semaphore that bounds
//! storage and quote work; a stage parked on the oracle holds no permit.

pub mod event_bus;
pub mod lifecycle;

use crate::handlers::{RealizationHandler, StageHandler, StageOutcome, StageTiming};
use crate::state::OrderStateMachine;
use crate::status::{Checkpoint, OrderLookup};
use quoteflow_config::Config;
use quoteflow_oracle::OracleService;
use quoteflow_quote::QuoteGenerator;
use quoteflow_storage::StorageService;
use quoteflow_types::{
	Order, OrderEvent, OrderId, Stage, StageEvent, StageStatus, StorageKey, WorkflowEvent,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Semaphore};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Handler error: {0}")]
	Handler(String),
	#[error("State error: {0}")]
	State(String),
}

/// One queued stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageJob {
	pub order_id: OrderId,
	pub stage: Stage,
}

/// Main engine coordinating storage, oracle and stage handlers.
#[derive(Clone)]
pub struct WorkflowEngine {
	/// Engine configuration.
	pub(crate) config: Config,
	/// Storage service for persisting orders.
	pub(crate) storage: Arc<StorageService>,
	/// Approval oracle.
	pub(crate) oracle: Arc<OracleService>,
	/// Quote generator used by supplier validation.
	pub(crate) quotes: Arc<QuoteGenerator>,
	/// Event bus for observers.
	pub(crate) event_bus: event_bus::EventBus,
	/// Order state machine
	pub(crate) state_machine: Arc<OrderStateMachine>,
	/// Handler for oracle-gated stages
	pub(crate) stage_handler: Arc<StageHandler>,
	/// Handler for service realization
	pub(crate) realization_handler: Arc<RealizationHandler>,
	job_sender: mpsc::UnboundedSender<StageJob>,
	/// Taken by the dispatch loop while it runs.
	job_receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<StageJob>>>>,
}

impl WorkflowEngine {
	/// Creates a new workflow engine with the given services
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		oracle: Arc<OracleService>,
		quotes: Arc<QuoteGenerator>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));
		let work_permits = Arc::new(Semaphore::new(config.engine.max_concurrent_stages));

		let stage_handler = Arc::new(StageHandler::new(
			oracle.clone(),
			quotes.clone(),
			state_machine.clone(),
			event_bus.clone(),
			StageTiming::from(&config.engine),
			work_permits.clone(),
		));

		let realization_handler = Arc::new(RealizationHandler::new(
			state_machine.clone(),
			event_bus.clone(),
			work_permits,
		));

		let (job_sender, job_receiver) = mpsc::unbounded_channel();

		Self {
			config,
			storage,
			oracle,
			quotes,
			event_bus,
			state_machine,
			stage_handler,
			realization_handler,
			job_sender,
			job_receiver: Arc::new(Mutex::new(Some(job_receiver))),
		}
	}

	/// Creates and stores a new order and schedules its first stage.
	///
	/// Jobs queued before [`run`](Self::run) starts are processed once the
	/// dispatch loop is up.
	pub async fn place_order(
		&self,
		name: impl Into<String>,
		email: impl Into<String>,
	) -> Result<Order, EngineError> {
		let order_id = self
			.storage
			.next_sequence(StorageKey::Orders.as_str())
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		let now = OrderStateMachine::now().map_err(|e| EngineError::State(e.to_string()))?;

		let order = Order::new(order_id, name, email, now);
		self.state_machine
			.store_order(&order)
			.await
			.map_err(|e| EngineError::State(e.to_string()))?;

		tracing::info!(order_id, "Order placed");
		self.event_bus
			.publish(WorkflowEvent::Order(OrderEvent::Placed { order_id }))
			.ok();

		self.schedule(order_id, Stage::first())?;
		Ok(order)
	}

	/// Queues a stage run.
	pub(crate) fn schedule(&self, order_id: OrderId, stage: Stage) -> Result<(), EngineError> {
		self.job_sender
			.send(StageJob { order_id, stage })
			.map_err(|_| EngineError::Service("stage queue is closed".into()))?;

		tracing::debug!(order_id, stage = %stage, "Stage scheduled");
		self.event_bus
			.publish(WorkflowEvent::Stage(StageEvent::Scheduled { order_id, stage }))
			.ok();
		Ok(())
	}

	/// Runs the dispatch loop until Ctrl+C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!("Failed to listen for shutdown signal: {}", e);
				std::future::pending::<()>().await;
			}
		})
		.await
	}

	/// Runs the dispatch loop until `shutdown` completes.
	///
	/// Stage runs already spawned are not cancelled. Jobs still queued stay
	/// queued for a later run.
	pub async fn run_until<S>(&self, shutdown: S) -> Result<(), EngineError>
	where
		S: Future<Output = ()>,
	{
		let mut jobs = self
			.job_receiver
			.lock()
			.await
			.take()
			.ok_or_else(|| EngineError::Service("engine is already running".into()))?;

		if let Err(e) = self.initialize().await {
			*self.job_receiver.lock().await = Some(jobs);
			return Err(e);
		}

		// Start storage cleanup task
		let storage = self.storage.clone();
		let cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = cleanup_interval;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				Some(job) = jobs.recv() => {
					self.spawn_handler(move |engine| async move {
						engine.process(job).await
					});
				}

				_ = &mut shutdown => {
					break;
				}
			}
		}

		cleanup_handle.abort();
		*self.job_receiver.lock().await = Some(jobs);

		self.shutdown().await
	}

	/// Runs one stage job and queues whatever comes next.
	async fn process(&self, job: StageJob) -> Result<(), EngineError> {
		let outcome = match job.stage {
			Stage::ServiceRealization => self.realization_handler.realize(job.order_id).await,
			stage => self.stage_handler.handle(job.order_id, stage).await,
		}
		.map_err(|e| {
			EngineError::Handler(format!(
				"Stage {} of order {} failed: {}",
				job.stage, job.order_id, e
			))
		})?;

		if let StageOutcome::Schedule(next) = outcome {
			self.schedule(job.order_id, next)?;
		}
		Ok(())
	}

	/// Reports one checkpoint of an order.
	pub async fn checkpoint_status(
		&self,
		order_id: OrderId,
		checkpoint: Checkpoint,
	) -> Result<StageStatus, EngineError> {
		let order = self
			.state_machine
			.find_order(order_id)
			.await
			.map_err(|e| EngineError::State(e.to_string()))?;
		Ok(checkpoint.status(order.as_ref()))
	}

	/// Looks up an order, telling rejected orders apart from unknown ones.
	pub async fn lookup_order(&self, order_id: OrderId) -> Result<OrderLookup, EngineError> {
		let map_err = |e: crate::state::OrderStateError| EngineError::State(e.to_string());

		if let Some(order) = self.state_machine.find_order(order_id).await.map_err(map_err)? {
			return Ok(OrderLookup::Active(order));
		}
		match self
			.state_machine
			.find_rejection(order_id)
			.await
			.map_err(map_err)?
		{
			Some(rejection) => Ok(OrderLookup::Rejected(rejection)),
			None => Ok(OrderLookup::NotFound),
		}
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Returns a reference to the oracle service.
	pub fn oracle(&self) -> &Arc<OracleService> {
		&self.oracle
	}

	/// Returns a reference to the quote generator.
	pub fn quotes(&self) -> &Arc<QuoteGenerator> {
		&self.quotes
	}

	/// Spawns a handler task.
	///
	/// Errors returned by the handler are logged, never propagated.
	fn spawn_handler<F, Fut>(&self, handler: F)
	where
		F: FnOnce(WorkflowEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
	{
		let engine = self.clone();
		tokio::spawn(async move {
			if let Err(e) = handler(engine).await {
				tracing::error!("Handler error: {}", e);
			}
		});
	}
}
