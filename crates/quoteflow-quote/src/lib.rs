//! Quote generation for the quoteflow system.
//!
//! Produces the quote document reviewed during supplier validation and
//! client evaluation. Each order has at most one quote file; generating it
//! again overwrites the previous one.

use quoteflow_types::OrderId;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod artifact;
pub mod pricing;

pub use artifact::QuoteArtifact;
pub use pricing::{FixedPricing, PricingStrategy, RandomPricing};

/// Errors that can occur while producing or reading quotes.
#[derive(Debug, Error)]
pub enum QuoteError {
	/// Filesystem failure.
	#[error("IO error: {0}")]
	Io(String),
	/// The requested quote file does not exist.
	#[error("Quote not found: {0}")]
	NotFound(String),
	/// A quote file does not follow the expected format.
	#[error("Parse error: {0}")]
	Parse(String),
	/// Invalid generator settings.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Result of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuote {
	pub file_name: String,
	pub cost: u32,
}

/// Writes quote files into one output directory.
pub struct QuoteGenerator {
	output_dir: PathBuf,
	pricing: Box<dyn PricingStrategy>,
}

impl QuoteGenerator {
	pub fn new(output_dir: impl Into<PathBuf>, pricing: Box<dyn PricingStrategy>) -> Self {
		Self {
			output_dir: output_dir.into(),
			pricing,
		}
	}

	pub fn output_dir(&self) -> &Path {
		&self.output_dir
	}

	/// Prices and writes the quote of one order.
	///
	/// The file is written to a temporary name first and renamed into
	/// place, so readers never see a partial quote.
	pub async fn generate(
		&self,
		order_id: OrderId,
		name: &str,
		email: &str,
	) -> Result<GeneratedQuote, QuoteError> {
		let artifact = QuoteArtifact {
			order_id,
			name: name.to_string(),
			email: email.to_string(),
			cost: self.pricing.price(order_id),
		};
		let file_name = QuoteArtifact::file_name(order_id);

		tokio::fs::create_dir_all(&self.output_dir)
			.await
			.map_err(|e| QuoteError::Io(e.to_string()))?;

		let path = self.output_dir.join(&file_name);
		let temp_path = self.output_dir.join(format!(".{}.tmp", file_name));
		tokio::fs::write(&temp_path, artifact.to_string())
			.await
			.map_err(|e| QuoteError::Io(e.to_string()))?;
		tokio::fs::rename(&temp_path, &path)
			.await
			.map_err(|e| QuoteError::Io(e.to_string()))?;

		tracing::info!(
			order_id,
			file = %path.display(),
			cost = artifact.cost,
			"Quote generated"
		);

		Ok(GeneratedQuote {
			file_name,
			cost: artifact.cost,
		})
	}

	/// Reads back a quote previously written by this generator.
	pub async fn load(&self, file_name: &str) -> Result<QuoteArtifact, QuoteError> {
		// Only bare file names; never follow paths out of the output directory.
		if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
			return Err(QuoteError::NotFound(file_name.to_string()));
		}

		let content = tokio::fs::read_to_string(self.output_dir.join(file_name))
			.await
			.map_err(|e| match e.kind() {
				std::io::ErrorKind::NotFound => QuoteError::NotFound(file_name.to_string()),
				_ => QuoteError::Io(e.to_string()),
			})?;
		QuoteArtifact::parse(&content)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_generate_then_load() {
		let temp_dir = TempDir::new().unwrap();
		let generator = QuoteGenerator::new(
			temp_dir.path().join("quotes"),
			Box::new(RandomPricing::default()),
		);

		let generated = generator.generate(1, "A", "a@x.com").await.unwrap();
		assert_eq!(generated.file_name, "quote_1.txt");
		assert!(generated.cost <= 400);

		let artifact = generator.load(&generated.file_name).await.unwrap();
		assert_eq!(artifact.order_id, 1);
		assert_eq!(artifact.name, "A");
		assert_eq!(artifact.email, "a@x.com");
		assert_eq!(artifact.cost, generated.cost);

		// No temporary file left behind.
		let entries: Vec<_> = std::fs::read_dir(generator.output_dir())
			.unwrap()
			.map(|e| e.unwrap().file_name())
			.collect();
		assert_eq!(entries, vec![std::ffi::OsString::from("quote_1.txt")]);
	}

	#[tokio::test]
	async fn test_regeneration_overwrites() {
		let temp_dir = TempDir::new().unwrap();
		let first = QuoteGenerator::new(temp_dir.path(), Box::new(FixedPricing(10)));
		let second = QuoteGenerator::new(temp_dir.path(), Box::new(FixedPricing(20)));

		first.generate(3, "B", "b@x.com").await.unwrap();
		second.generate(3, "B", "b@x.com").await.unwrap();

		let artifact = first.load("quote_3.txt").await.unwrap();
		assert_eq!(artifact.cost, 20);
	}

	#[tokio::test]
	async fn test_load_missing_and_escaping_paths() {
		let temp_dir = TempDir::new().unwrap();
		let generator = QuoteGenerator::new(temp_dir.path(), Box::new(FixedPricing(1)));

		assert!(matches!(
			generator.load("quote_9.txt").await,
			Err(QuoteError::NotFound(_))
		));
		assert!(matches!(
			generator.load("../secret.txt").await,
			Err(QuoteError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_unwritable_directory_is_io_error() {
		let temp_dir = TempDir::new().unwrap();
		let blocker = temp_dir.path().join("file");
		std::fs::write(&blocker, "not a directory").unwrap();

		let generator = QuoteGenerator::new(&blocker, Box::new(FixedPricing(1)));
		assert!(matches!(
			generator.generate(1, "A", "a@x.com").await,
			Err(QuoteError::Io(_))
		));
	}
}
