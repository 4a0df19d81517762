//! Configuration builder for tests and embedded setups.
//!
//! Produces a `Config` backed by in-memory storage and the automatic oracle,
//! with engine timings that can be tightened for fast scenarios.

use crate::{ApiConfig, Config, EngineConfig, OracleConfig, QuoteConfig, StorageConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	engine_id: String,
	settle_delay_seconds: u64,
	poll_interval_seconds: u64,
	decision_timeout_seconds: Option<u64>,
	indeterminate_retry_limit: Option<u32>,
	max_concurrent_stages: usize,
	storage_primary: String,
	storage_implementation: toml::Value,
	oracle_primary: String,
	oracle_implementation: toml::Value,
	quotes: QuoteConfig,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			engine_id: "test-engine".to_string(),
			settle_delay_seconds: 5,
			poll_interval_seconds: 1,
			decision_timeout_seconds: None,
			indeterminate_retry_limit: None,
			max_concurrent_stages: 100,
			storage_primary: "memory".to_string(),
			storage_implementation: toml::Value::Table(toml::map::Map::new()),
			oracle_primary: "auto".to_string(),
			oracle_implementation: toml::Value::Table(toml::map::Map::new()),
			quotes: QuoteConfig::default(),
			api: None,
		}
	}

	pub fn engine_id(mut self, id: impl Into<String>) -> Self {
		self.engine_id = id.into();
		self
	}

	pub fn settle_delay_seconds(mut self, seconds: u64) -> Self {
		self.settle_delay_seconds = seconds;
		self
	}

	pub fn poll_interval_seconds(mut self, seconds: u64) -> Self {
		self.poll_interval_seconds = seconds;
		self
	}

	pub fn decision_timeout_seconds(mut self, seconds: u64) -> Self {
		self.decision_timeout_seconds = Some(seconds);
		self
	}

	pub fn indeterminate_retry_limit(mut self, limit: u32) -> Self {
		self.indeterminate_retry_limit = Some(limit);
		self
	}

	pub fn max_concurrent_stages(mut self, limit: usize) -> Self {
		self.max_concurrent_stages = limit;
		self
	}

	/// Selects the storage implementation and its settings table.
	pub fn storage(mut self, primary: impl Into<String>, settings: toml::Value) -> Self {
		self.storage_primary = primary.into();
		self.storage_implementation = settings;
		self
	}

	/// Selects the oracle implementation and its settings table.
	pub fn oracle(mut self, primary: impl Into<String>, settings: toml::Value) -> Self {
		self.oracle_primary = primary.into();
		self.oracle_implementation = settings;
		self
	}

	pub fn quote_output_dir(mut self, dir: impl Into<String>) -> Self {
		self.quotes.output_dir = dir.into();
		self
	}

	pub fn cost_range(mut self, min_cost: u32, max_cost: u32) -> Self {
		self.quotes.min_cost = min_cost;
		self.quotes.max_cost = max_cost;
		self
	}

	pub fn api(mut self, api: ApiConfig) -> Self {
		self.api = Some(api);
		self
	}

	pub fn build(self) -> Config {
		Config {
			engine: EngineConfig {
				id: self.engine_id,
				settle_delay_seconds: self.settle_delay_seconds,
				poll_interval_seconds: self.poll_interval_seconds,
				decision_timeout_seconds: self.decision_timeout_seconds,
				indeterminate_retry_limit: self.indeterminate_retry_limit,
				max_concurrent_stages: self.max_concurrent_stages,
			},
			storage: StorageConfig {
				implementations: HashMap::from([(
					self.storage_primary.clone(),
					self.storage_implementation,
				)]),
				primary: self.storage_primary,
				cleanup_interval_seconds: 3600,
			},
			oracle: OracleConfig {
				implementations: HashMap::from([(
					self.oracle_primary.clone(),
					self.oracle_implementation,
				)]),
				primary: self.oracle_primary,
			},
			quotes: self.quotes,
			api: self.api,
		}
	}
}
