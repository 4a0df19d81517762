//! Event types published while orders move through the pipeline.
//!
//! Events are informational. Scheduling does not depend on them, so
//! observers (notifications, tests, metrics) can subscribe and lag freely.

use crate::{OrderId, Stage};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all workflow events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
	/// Events about the order as a whole.
	Order(OrderEvent),
	/// Events about a single stage run.
	Stage(StageEvent),
}

/// Order-level events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A new order was stored and its first stage scheduled.
	Placed { order_id: OrderId },
	/// A stage rejected the order and it was removed from the store.
	Rejected { order_id: OrderId, stage: Stage },
	/// The realization was validated; nothing is left to do.
	Completed { order_id: OrderId },
}

/// Stage-level events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageEvent {
	/// A stage run was queued.
	Scheduled { order_id: OrderId, stage: Stage },
	/// A stage resolved successfully.
	Approved { order_id: OrderId, stage: Stage },
	/// The oracle gave no usable answer; the stage will poll again.
	Indeterminate {
		order_id: OrderId,
		stage: Stage,
		attempt: u32,
	},
	/// The quote artifact was written.
	QuoteGenerated {
		order_id: OrderId,
		file_name: String,
		cost: u32,
	},
	/// Realization validation was refused and the service must be redone.
	RealizationReset { order_id: OrderId, attempt: u32 },
}
