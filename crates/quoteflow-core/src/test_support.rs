//! Helpers shared by the engine and handler tests.

use crate::engine::event_bus::EventBus;
use crate::engine::WorkflowEngine;
use async_trait::async_trait;
use quoteflow_config::ConfigBuilder;
use quoteflow_oracle::{OracleError, OracleInterface, OracleService};
use quoteflow_quote::{QuoteGenerator, RandomPricing};
use quoteflow_storage::implementations::memory::MemoryStorage;
use quoteflow_storage::StorageService;
use quoteflow_types::{
	ConfigSchema, Decision, DecisionRequest, OrderId, Schema, Stage, ValidationError,
	WorkflowEvent,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Default)]
struct Script {
	answers: HashMap<(OrderId, Stage), VecDeque<Decision>>,
	fallback: Option<Decision>,
	calls: Vec<(OrderId, Stage, Instant)>,
}

/// Oracle answering from per-order, per-stage scripts.
///
/// Once a script runs out the fallback decision is returned.
#[derive(Clone, Default)]
pub struct ScriptedOracle {
	script: Arc<Mutex<Script>>,
}

impl ScriptedOracle {
	pub fn new(fallback: Decision) -> Self {
		let oracle = Self::default();
		oracle.script.lock().unwrap().fallback = Some(fallback);
		oracle
	}

	pub fn script(
		&self,
		order_id: OrderId,
		stage: Stage,
		answers: impl IntoIterator<Item = Decision>,
	) -> &Self {
		self.script
			.lock()
			.unwrap()
			.answers
			.entry((order_id, stage))
			.or_default()
			.extend(answers);
		self
	}

	/// Every consultation so far, in call order.
	pub fn calls(&self) -> Vec<(OrderId, Stage)> {
		self.script
			.lock()
			.unwrap()
			.calls
			.iter()
			.map(|(order_id, stage, _)| (*order_id, *stage))
			.collect()
	}

	/// When each consultation of one stage happened.
	pub fn call_times(&self, order_id: OrderId, stage: Stage) -> Vec<Instant> {
		self.script
			.lock()
			.unwrap()
			.calls
			.iter()
			.filter(|(o, s, _)| *o == order_id && *s == stage)
			.map(|(_, _, at)| *at)
			.collect()
	}
}

struct NoFields;

impl ConfigSchema for NoFields {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl OracleInterface for ScriptedOracle {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoFields)
	}

	async fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
		let mut script = self.script.lock().unwrap();
		script
			.calls
			.push((request.order_id, request.stage, Instant::now()));
		let scripted = script
			.answers
			.get_mut(&(request.order_id, request.stage))
			.and_then(|answers| answers.pop_front());
		scripted
			.or(script.fallback)
			.ok_or_else(|| OracleError::Closed("script exhausted".into()))
	}
}

/// Builds an engine over memory storage with quotes written to `quotes_dir`.
pub fn engine_with(
	oracle: Box<dyn OracleInterface>,
	quotes_dir: &Path,
	configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
) -> WorkflowEngine {
	let config = configure(ConfigBuilder::new().quote_output_dir(quotes_dir.to_string_lossy()))
		.build();
	let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
	let oracle = Arc::new(OracleService::new(
		oracle,
		config.engine.decision_timeout(),
	));
	let quotes = Arc::new(QuoteGenerator::new(
		quotes_dir,
		Box::new(RandomPricing::default()),
	));
	WorkflowEngine::new(config, storage, oracle, quotes, EventBus::default())
}

/// Waits for the first event matching `predicate`.
///
/// Panics if none arrives within an hour of (usually paused) time.
pub async fn wait_for<F>(
	events: &mut broadcast::Receiver<WorkflowEvent>,
	predicate: F,
) -> WorkflowEvent
where
	F: Fn(&WorkflowEvent) -> bool,
{
	tokio::time::timeout(Duration::from_secs(3600), async {
		loop {
			let event = events.recv().await.expect("event bus closed");
			if predicate(&event) {
				return event;
			}
		}
	})
	.await
	.expect("timed out waiting for event")
}
