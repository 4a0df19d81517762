//! Lifecycle management for the workflow engine.
//!
//! Handles the work done right before the dispatch loop starts and right
//! after it stops.

use super::{EngineError, WorkflowEngine};

impl WorkflowEngine {
	/// Prepares the quote directory before any stage runs.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			engine_id = %self.config.engine.id,
			oracle = %self.config.oracle.primary,
			storage = %self.config.storage.primary,
			"Initializing workflow engine"
		);

		tokio::fs::create_dir_all(self.quotes.output_dir())
			.await
			.map_err(|e| {
				EngineError::Config(format!(
					"Cannot create quote directory {}: {}",
					self.quotes.output_dir().display(),
					e
				))
			})
	}

	/// Performs cleanup operations
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down workflow engine");

		let pending = self.oracle.pending();
		if !pending.is_empty() {
			tracing::warn!(
				count = pending.len(),
				"Decisions still pending at shutdown"
			);
		}
		Ok(())
	}
}
