//! Configuration module for the quoteflow system.
//!
//! Configuration is read from TOML. `${VAR}` and `${VAR:-default}`
//! placeholders are replaced from the environment before parsing, and
//! configurations can be split into several files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files

pub mod builders;
mod loader;

pub use builders::config::ConfigBuilder;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Workflow engine settings.
	pub engine: EngineConfig,
	/// Record store backend.
	pub storage: StorageConfig,
	/// Approval oracle backend.
	pub oracle: OracleConfig,
	/// Quote generation settings.
	#[serde(default)]
	pub quotes: QuoteConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Timing and concurrency settings of the workflow engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Identifier of this instance, used in logs.
	pub id: String,
	/// Wait before a stage's first oracle consultation.
	#[serde(default = "default_settle_delay_seconds")]
	pub settle_delay_seconds: u64,
	/// Wait between two consultations after an indeterminate answer.
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
	/// Upper bound for one oracle call. A call that runs longer counts as
	/// indeterminate. Unset means the call may wait forever.
	#[serde(default)]
	pub decision_timeout_seconds: Option<u64>,
	/// Consecutive indeterminate answers tolerated before the stage is
	/// rejected. Unset means retry forever.
	#[serde(default)]
	pub indeterminate_retry_limit: Option<u32>,
	/// Maximum number of stage runs doing storage or quote work at once.
	/// Stages waiting on the oracle or on a delay do not count.
	#[serde(default = "default_max_concurrent_stages")]
	pub max_concurrent_stages: usize,
}

fn default_settle_delay_seconds() -> u64 {
	5
}

fn default_poll_interval_seconds() -> u64 {
	1
}

fn default_max_concurrent_stages() -> usize {
	100
}

impl EngineConfig {
	pub fn settle_delay(&self) -> Duration {
		Duration::from_secs(self.settle_delay_seconds)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_seconds)
	}

	pub fn decision_timeout(&self) -> Option<Duration> {
		self.decision_timeout_seconds.map(Duration::from_secs)
	}
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3600
}

/// Configuration for the approval oracle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OracleConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of oracle implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Quote generation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuoteConfig {
	/// Directory the quote artifacts are written to.
	#[serde(default = "default_quote_output_dir")]
	pub output_dir: String,
	/// Lowest generated cost (inclusive).
	#[serde(default)]
	pub min_cost: u32,
	/// Highest generated cost (inclusive).
	#[serde(default = "default_max_cost")]
	pub max_cost: u32,
}

fn default_quote_output_dir() -> String {
	"./data/quotes".to_string()
}

fn default_max_cost() -> u32 {
	400
}

impl Default for QuoteConfig {
	fn default() -> Self {
		Self {
			output_dir: default_quote_output_dir(),
			min_cost: 0,
			max_cost: default_max_cost(),
		}
	}
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME` and supports
/// defaults with `${VAR_NAME:-default_value}`. Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.id.is_empty() {
			return Err(ConfigError::Validation("Engine ID cannot be empty".into()));
		}
		if self.engine.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Engine poll_interval_seconds must be greater than 0".into(),
			));
		}
		if self.engine.decision_timeout_seconds == Some(0) {
			return Err(ConfigError::Validation(
				"Engine decision_timeout_seconds must be greater than 0 when set".into(),
			));
		}
		if self.engine.max_concurrent_stages == 0 {
			return Err(ConfigError::Validation(
				"Engine max_concurrent_stages must be greater than 0".into(),
			));
		}

		validate_selection(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		validate_selection("oracle", &self.oracle.primary, &self.oracle.implementations)?;

		if self.quotes.output_dir.is_empty() {
			return Err(ConfigError::Validation(
				"Quotes output_dir cannot be empty".into(),
			));
		}
		if self.quotes.min_cost > self.quotes.max_cost {
			return Err(ConfigError::Validation(format!(
				"Quotes min_cost ({}) cannot exceed max_cost ({})",
				self.quotes.min_cost, self.quotes.max_cost
			)));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.host.is_empty() {
				return Err(ConfigError::Validation("API host cannot be empty".into()));
			}
		}

		Ok(())
	}
}

/// Checks that `primary` names one of the configured implementations.
fn validate_selection(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[engine]
id = "test-engine"

[storage]
primary = "memory"
[storage.implementations.memory]

[oracle]
primary = "auto"
[oracle.implementations.auto]
"#;

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.engine.id, "test-engine");
		assert_eq!(config.engine.settle_delay(), Duration::from_secs(5));
		assert_eq!(config.engine.poll_interval(), Duration::from_secs(1));
		assert_eq!(config.engine.decision_timeout(), None);
		assert_eq!(config.engine.indeterminate_retry_limit, None);
		assert_eq!(config.storage.cleanup_interval_seconds, 3600);
		assert_eq!(config.quotes.min_cost, 0);
		assert_eq!(config.quotes.max_cost, 400);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("QF_TEST_HOST", "localhost");
		std::env::set_var("QF_TEST_PORT", "5432");

		let result = resolve_env_vars("host = \"${QF_TEST_HOST}:${QF_TEST_PORT}\"").unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("QF_TEST_HOST");
		std::env::remove_var("QF_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let result = resolve_env_vars("value = \"${QF_MISSING_VAR:-fallback}\"").unwrap();
		assert_eq!(result, "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("value = \"${QF_MISSING_VAR}\"");
		assert!(result.unwrap_err().to_string().contains("QF_MISSING_VAR"));
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("QF_TEST_ENGINE_ID", "from-env");
		let config: Config = MINIMAL
			.replace("\"test-engine\"", "\"${QF_TEST_ENGINE_ID}\"")
			.parse()
			.unwrap();
		assert_eq!(config.engine.id, "from-env");
		std::env::remove_var("QF_TEST_ENGINE_ID");
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let result = MINIMAL
			.replace("primary = \"auto\"", "primary = \"console\"")
			.parse::<Config>();
		let message = result.unwrap_err().to_string();
		assert!(message.contains("Primary oracle 'console'"));
	}

	#[test]
	fn test_zero_poll_interval_rejected() {
		let config = MINIMAL.replace("id = \"test-engine\"", "id = \"e\"\npoll_interval_seconds = 0");
		assert!(config.parse::<Config>().is_err());
	}

	#[test]
	fn test_inverted_cost_range_rejected() {
		let config = format!("{}\n[quotes]\nmin_cost = 10\nmax_cost = 5\n", MINIMAL);
		let message = config.parse::<Config>().unwrap_err().to_string();
		assert!(message.contains("min_cost"));
	}
}
