//! Oracle parking each consultation until a decision is submitted.
//!
//! `decide` registers the request and waits on a oneshot channel. The HTTP
//! API lists parked requests through `pending` and resumes them through
//! `submit`. A consultation dropped before an answer arrives (for instance
//! by a decision timeout) removes its own entry.

use crate::{OracleError, OracleFactory, OracleInterface, OracleRegistry};
use async_trait::async_trait;
use dashmap::DashMap;
use quoteflow_types::{
	ConfigSchema, Decision, DecisionRequest, ImplementationRegistry, OrderId, Schema, Stage,
	ValidationError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

type ParkKey = (OrderId, Stage);

struct Parked {
	ticket: u64,
	request: DecisionRequest,
	sender: oneshot::Sender<Decision>,
}

/// Removes a parked entry when its consultation goes away.
struct ParkGuard<'a> {
	parked: &'a DashMap<ParkKey, Parked>,
	key: ParkKey,
	ticket: u64,
}

impl Drop for ParkGuard<'_> {
	fn drop(&mut self) {
		self.parked
			.remove_if(&self.key, |_, entry| entry.ticket == self.ticket);
	}
}

pub struct QueueOracle {
	parked: DashMap<ParkKey, Parked>,
	next_ticket: AtomicU64,
}

impl QueueOracle {
	pub fn new() -> Self {
		Self {
			parked: DashMap::new(),
			next_ticket: AtomicU64::new(0),
		}
	}
}

impl Default for QueueOracle {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl OracleInterface for QueueOracle {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(QueueOracleSchema)
	}

	async fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
		let key = (request.order_id, request.stage);
		let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
		let (sender, receiver) = oneshot::channel();

		let previous = self.parked.insert(
			key,
			Parked {
				ticket,
				request: request.clone(),
				sender,
			},
		);
		if previous.is_some() {
			tracing::warn!(
				order_id = request.order_id,
				stage = %request.stage,
				"Superseding an unanswered consultation"
			);
		}
		let _guard = ParkGuard {
			parked: &self.parked,
			key,
			ticket,
		};

		tracing::info!(
			order_id = request.order_id,
			stage = %request.stage,
			"Waiting for decision"
		);
		receiver
			.await
			.map_err(|_| OracleError::Closed("consultation superseded".into()))
	}

	fn submit(
		&self,
		order_id: OrderId,
		stage: Stage,
		decision: Decision,
	) -> Result<(), OracleError> {
		let (_, parked) = self
			.parked
			.remove(&(order_id, stage))
			.ok_or(OracleError::NoPendingDecision { order_id, stage })?;
		parked
			.sender
			.send(decision)
			.map_err(|_| OracleError::NoPendingDecision { order_id, stage })
	}

	fn pending(&self) -> Vec<DecisionRequest> {
		let mut pending: Vec<_> = self
			.parked
			.iter()
			.map(|entry| entry.value().request.clone())
			.collect();
		pending.sort_by_key(|request| request.order_id);
		pending
	}
}

/// Configuration schema for QueueOracle. No fields.
pub struct QueueOracleSchema;

impl ConfigSchema for QueueOracleSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a queue oracle from configuration.
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn OracleInterface>, OracleError> {
	QueueOracleSchema
		.validate(config)
		.map_err(|e| OracleError::Configuration(e.to_string()))?;
	Ok(Box::new(QueueOracle::new()))
}

/// Registry for the queue oracle implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "queue";
	type Factory = OracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl OracleRegistry for Registry {}
