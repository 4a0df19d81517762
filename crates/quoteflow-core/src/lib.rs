//! Core workflow engine for the quoteflow system.
//!
//! Drives each order through the approval pipeline: order validation,
//! quote generation and supplier validation, client evaluation, service
//! realization and realization validation. Decisions come from a pluggable
//! approval oracle; state lives in a pluggable store.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod state;
pub mod status;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderError, EngineBuilder, EngineFactories};
pub use engine::event_bus::EventBus;
pub use engine::{EngineError, StageJob, WorkflowEngine};
pub use handlers::{StageError, StageOutcome};
pub use state::{OrderStateError, OrderStateMachine};
pub use status::{Checkpoint, OrderLookup};
