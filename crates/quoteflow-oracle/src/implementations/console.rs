//! Interactive oracle reading operator answers from standard input.
//!
//! Prompts are serialized: while one stage waits for its line, others queue
//! on the lock. Each consultation reads exactly one line.

use crate::{OracleError, OracleFactory, OracleInterface, OracleRegistry};
use async_trait::async_trait;
use quoteflow_types::{
	ConfigSchema, Decision, DecisionRequest, ImplementationRegistry, Schema, ValidationError,
};
use tokio::io::{
	AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;

struct ConsoleIo<R, W> {
	lines: Lines<R>,
	output: W,
}

/// Oracle asking an operator through a line-based terminal.
pub struct ConsoleOracle<R = BufReader<Stdin>, W = Stdout> {
	io: Mutex<ConsoleIo<R, W>>,
}

impl ConsoleOracle {
	/// Creates an oracle bound to the process stdin and stdout.
	pub fn new() -> Self {
		Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
	}
}

impl Default for ConsoleOracle {
	fn default() -> Self {
		Self::new()
	}
}

impl<R, W> ConsoleOracle<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	pub fn with_io(input: R, output: W) -> Self {
		Self {
			io: Mutex::new(ConsoleIo {
				lines: input.lines(),
				output,
			}),
		}
	}

	/// Consumes the oracle and returns its output sink.
	pub fn into_output(self) -> W {
		self.io.into_inner().output
	}
}

#[async_trait]
impl<R, W> OracleInterface for ConsoleOracle<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ConsoleOracleSchema)
	}

	async fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
		let mut io = self.io.lock().await;

		io.output
			.write_all(request.prompt().as_bytes())
			.await
			.map_err(|e| OracleError::Io(e.to_string()))?;
		io.output
			.flush()
			.await
			.map_err(|e| OracleError::Io(e.to_string()))?;

		let line = io
			.lines
			.next_line()
			.await
			.map_err(|e| OracleError::Io(e.to_string()))?
			.ok_or_else(|| OracleError::Closed("standard input reached end of file".into()))?;

		let decision = Decision::from_input(&line);
		if !decision.is_definitive() {
			tracing::debug!(
				order_id = request.order_id,
				stage = %request.stage,
				input = %line.trim(),
				"Unrecognized answer"
			);
		}
		Ok(decision)
	}
}

/// Configuration schema for ConsoleOracle. No fields.
pub struct ConsoleOracleSchema;

impl ConfigSchema for ConsoleOracleSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a console oracle from configuration.
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn OracleInterface>, OracleError> {
	ConsoleOracleSchema
		.validate(config)
		.map_err(|e| OracleError::Configuration(e.to_string()))?;
	Ok(Box::new(ConsoleOracle::new()))
}

/// Registry for the console oracle implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "console";
	type Factory = OracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl OracleRegistry for Registry {}
