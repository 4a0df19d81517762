//! Handlers running individual pipeline stages.
//!
//! A handler drives one stage of one order to an outcome and reports which
//! stage, if any, should run next. Scheduling itself is left to the engine.

pub mod realization;
pub mod stage;

pub use realization::RealizationHandler;
pub use stage::{StageHandler, StageTiming};

use crate::state::OrderStateError;
use quoteflow_types::{OrderId, Stage, StageFlag};
use thiserror::Error;

/// Errors that can occur while running a stage.
#[derive(Debug, Error)]
pub enum StageError {
	#[error("State error: {0}")]
	State(String),
	#[error("Oracle error: {0}")]
	Oracle(String),
	#[error("Quote error: {0}")]
	Quote(String),
	#[error("Order {order_id} cannot enter {stage}: {missing} is not set")]
	PreconditionFailed {
		order_id: OrderId,
		stage: Stage,
		missing: StageFlag,
	},
	#[error("Stage {0} is not handled here")]
	Unsupported(Stage),
	#[error("No work permit available: {0}")]
	Permit(String),
}

impl From<OrderStateError> for StageError {
	fn from(err: OrderStateError) -> Self {
		StageError::State(err.to_string())
	}
}

/// How a stage run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
	/// Run this stage next.
	Schedule(Stage),
	/// The pipeline finished for this order.
	Completed,
	/// The order was rejected and removed.
	Rejected,
	/// The order disappeared while the stage was running.
	Vanished,
}
