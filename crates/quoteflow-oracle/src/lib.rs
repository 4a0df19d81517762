//! Approval oracle module for the quoteflow system.
//!
//! The oracle is the external decision source consulted at every gated
//! stage. Implementations range from an operator typing at the console to a
//! queue of parked decisions resumed through the HTTP API. All of them are
//! asynchronous so a slow decision for one order never blocks another.

use async_trait::async_trait;
use quoteflow_types::{
	ConfigSchema, Decision, DecisionRequest, ImplementationRegistry, OrderId, Stage,
};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod auto;
	pub mod console;
	pub mod queue;
}

/// Errors that can occur while obtaining a decision.
#[derive(Debug, Error)]
pub enum OracleError {
	/// The decision source is gone (closed input, dropped queue entry).
	#[error("Decision source closed: {0}")]
	Closed(String),
	/// Reading from or writing to the decision source failed.
	#[error("IO error: {0}")]
	Io(String),
	/// A decision was submitted for a stage that is not waiting for one.
	#[error("No pending decision for order {order_id} at stage {stage}")]
	NoPendingDecision { order_id: OrderId, stage: Stage },
	/// The implementation cannot accept submitted decisions.
	#[error("Operation not supported: {0}")]
	Unsupported(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for decision sources.
#[async_trait]
pub trait OracleInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Obtains a decision for one stage of one order.
	///
	/// May wait as long as the source needs. Callers bound the wait
	/// themselves when they have to.
	async fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError>;

	/// Resumes a decision parked by [`decide`](Self::decide).
	fn submit(
		&self,
		order_id: OrderId,
		stage: Stage,
		_decision: Decision,
	) -> Result<(), OracleError> {
		Err(OracleError::Unsupported(format!(
			"cannot submit decisions (order {}, stage {})",
			order_id, stage
		)))
	}

	/// Lists the decisions currently being waited for.
	fn pending(&self) -> Vec<DecisionRequest> {
		Vec::new()
	}
}

/// Type alias for oracle factory functions.
pub type OracleFactory = fn(&toml::Value) -> Result<Box<dyn OracleInterface>, OracleError>;

/// Registry trait for oracle implementations.
pub trait OracleRegistry: ImplementationRegistry<Factory = OracleFactory> {}

/// Get all registered oracle implementations.
pub fn get_all_implementations() -> Vec<(&'static str, OracleFactory)> {
	use implementations::{auto, console, queue};

	vec![
		(auto::Registry::NAME, auto::Registry::factory()),
		(console::Registry::NAME, console::Registry::factory()),
		(queue::Registry::NAME, queue::Registry::factory()),
	]
}

/// Service wrapping the configured decision source.
pub struct OracleService {
	implementation: Box<dyn OracleInterface>,
	/// Upper bound for a single consultation.
	timeout: Option<Duration>,
}

impl OracleService {
	pub fn new(implementation: Box<dyn OracleInterface>, timeout: Option<Duration>) -> Self {
		Self {
			implementation,
			timeout,
		}
	}

	/// Consults the oracle once.
	///
	/// A consultation that exceeds the configured timeout yields
	/// [`Decision::Indeterminate`]; the abandoned call is dropped.
	pub async fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
		let decision = match self.timeout {
			Some(timeout) => {
				match tokio::time::timeout(timeout, self.implementation.decide(request)).await {
					Ok(result) => result?,
					Err(_) => {
						tracing::debug!(
							order_id = request.order_id,
							stage = %request.stage,
							"No decision within {:?}",
							timeout
						);
						Decision::Indeterminate
					},
				}
			},
			None => self.implementation.decide(request).await?,
		};

		tracing::debug!(
			order_id = request.order_id,
			stage = %request.stage,
			decision = ?decision,
			"Oracle answered"
		);
		Ok(decision)
	}

	pub fn submit(
		&self,
		order_id: OrderId,
		stage: Stage,
		decision: Decision,
	) -> Result<(), OracleError> {
		self.implementation.submit(order_id, stage, decision)
	}

	pub fn pending(&self) -> Vec<DecisionRequest> {
		self.implementation.pending()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::auto::AutoOracle;
	use implementations::queue::QueueOracle;

	fn request() -> DecisionRequest {
		DecisionRequest {
			order_id: 1,
			stage: Stage::OrderValidation,
			name: "A".into(),
			email: "a@x.com".into(),
			quote_file_name: None,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_timeout_yields_indeterminate() {
		let service = OracleService::new(
			Box::new(QueueOracle::new()),
			Some(Duration::from_secs(2)),
		);
		let decision = service.decide(&request()).await.unwrap();
		assert_eq!(decision, Decision::Indeterminate);
		// The abandoned consultation no longer shows up as pending.
		assert!(service.pending().is_empty());
	}

	#[tokio::test]
	async fn test_submit_unsupported_by_default() {
		let service = OracleService::new(Box::new(AutoOracle::new(Decision::Approve)), None);
		assert!(matches!(
			service.submit(1, Stage::OrderValidation, Decision::Approve),
			Err(OracleError::Unsupported(_))
		));
		assert_eq!(service.decide(&request()).await.unwrap(), Decision::Approve);
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["auto", "console", "queue"]);
	}
}
