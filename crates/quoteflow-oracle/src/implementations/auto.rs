//! Oracle answering every request with the same configured decision.
//!
//! Meant for unattended runs and demos where no operator is available.

use crate::{OracleError, OracleFactory, OracleInterface, OracleRegistry};
use async_trait::async_trait;
use quoteflow_types::{
	ConfigSchema, Decision, DecisionRequest, Field, FieldType, ImplementationRegistry, Schema,
	ValidationError,
};

pub struct AutoOracle {
	decision: Decision,
}

impl AutoOracle {
	pub fn new(decision: Decision) -> Self {
		Self { decision }
	}
}

#[async_trait]
impl OracleInterface for AutoOracle {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AutoOracleSchema)
	}

	async fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
		tracing::info!(
			order_id = request.order_id,
			stage = %request.stage,
			"Auto-deciding {:?}",
			self.decision
		);
		Ok(self.decision)
	}
}

/// Configuration schema for AutoOracle.
pub struct AutoOracleSchema;

impl ConfigSchema for AutoOracleSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("decision", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some("approve" | "reject") => Ok(()),
					_ => Err("must be 'approve' or 'reject'".to_string()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create an auto oracle from configuration.
///
/// Configuration parameters:
/// - `decision`: "approve" (default) or "reject"
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn OracleInterface>, OracleError> {
	AutoOracleSchema
		.validate(config)
		.map_err(|e| OracleError::Configuration(e.to_string()))?;

	let decision = match config.get("decision").and_then(|v| v.as_str()) {
		Some("reject") => Decision::Reject,
		_ => Decision::Approve,
	};
	Ok(Box::new(AutoOracle::new(decision)))
}

/// Registry for the auto oracle implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "auto";
	type Factory = OracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl OracleRegistry for Registry {}
