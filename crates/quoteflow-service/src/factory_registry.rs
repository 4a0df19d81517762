//! Dynamic factory registry for quoteflow implementations.
//!
//! Every storage backend and oracle registers itself here by name, so the
//! engine can be assembled from nothing but the configuration file.

use quoteflow_config::Config;
use quoteflow_core::{EngineBuilder, EngineFactories, WorkflowEngine};
use quoteflow_oracle::OracleFactory;
use quoteflow_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub oracle: HashMap<String, OracleFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			oracle: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_oracle(&mut self, name: impl Into<String>, factory: OracleFactory) {
		self.oracle.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in quoteflow_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in quoteflow_oracle::get_all_implementations() {
			tracing::debug!("Registering oracle implementation: {}", name);
			registry.register_oracle(name, factory);
		}

		registry
	})
}

/// Picks the factory of every configured implementation, failing on names
/// nothing registered.
fn select_factories<F: Copy>(
	available: &HashMap<String, F>,
	configured: &HashMap<String, toml::Value>,
	kind: &str,
) -> Result<HashMap<String, F>, String> {
	let mut factories = HashMap::new();
	for name in configured.keys() {
		let Some(factory) = available.get(name) else {
			let mut names: Vec<_> = available.keys().cloned().collect();
			names.sort();
			return Err(format!(
				"Unknown {} implementation '{}'. Available: [{}]",
				kind,
				name,
				names.join(", ")
			));
		};
		factories.insert(name.clone(), *factory);
	}
	Ok(factories)
}

/// Build the workflow engine using the registry and config
pub fn build_engine_from_config(
	config: Config,
) -> Result<WorkflowEngine, Box<dyn std::error::Error>> {
	let registry = initialize_registry();

	let storage_factories =
		select_factories(&registry.storage, &config.storage.implementations, "storage")?;
	let oracle_factories =
		select_factories(&registry.oracle, &config.oracle.implementations, "oracle")?;

	let factories = EngineFactories {
		storage_factories,
		oracle_factories,
	};

	Ok(EngineBuilder::new(config).build(factories)?)
}
