//! Builder pattern for constructing workflow engines.
//!
//! Composes a WorkflowEngine from the storage and oracle implementations
//! named in the configuration, using factory functions keyed by
//! implementation name.

use crate::engine::{event_bus::EventBus, WorkflowEngine};
use quoteflow_config::Config;
use quoteflow_oracle::{OracleError, OracleInterface, OracleService};
use quoteflow_quote::{QuoteGenerator, RandomPricing};
use quoteflow_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for the factory functions needed to build a WorkflowEngine.
pub struct EngineFactories<SF, OF> {
	pub storage_factories: HashMap<String, SF>,
	pub oracle_factories: HashMap<String, OF>,
}

/// Builder for constructing a WorkflowEngine with pluggable implementations.
pub struct EngineBuilder {
	config: Config,
}

impl EngineBuilder {
	/// Creates a new EngineBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the WorkflowEngine using the factories for each component.
	pub fn build<SF, OF>(
		self,
		factories: EngineFactories<SF, OF>,
	) -> Result<WorkflowEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		OF: Fn(&toml::Value) -> Result<Box<dyn OracleInterface>, OracleError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let oracle_backend = load_primary(
			"oracle",
			&self.config.oracle.primary,
			&self.config.oracle.implementations,
			&factories.oracle_factories,
		)?;
		let oracle = Arc::new(OracleService::new(
			oracle_backend,
			self.config.engine.decision_timeout(),
		));

		let pricing =
			RandomPricing::new(self.config.quotes.min_cost, self.config.quotes.max_cost)
				.map_err(|e| BuilderError::Config(e.to_string()))?;
		let quotes = Arc::new(QuoteGenerator::new(
			&self.config.quotes.output_dir,
			Box::new(pricing),
		));
		tracing::info!(
			component = "quotes",
			output_dir = %self.config.quotes.output_dir,
			min_cost = self.config.quotes.min_cost,
			max_cost = self.config.quotes.max_cost,
			"Loaded"
		);

		Ok(WorkflowEngine::new(
			self.config,
			storage,
			oracle,
			quotes,
			EventBus::new(1000),
		))
	}
}

/// Creates every configured implementation that has a factory and returns
/// the primary one.
fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				// Validation already happened in the factory
				let is_primary = primary == name.as_str();
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}
