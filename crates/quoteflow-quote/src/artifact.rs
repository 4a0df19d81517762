//! Text format of quote files.
//!
//! A quote is four labeled lines:
//!
//! ```text
//! id: 12
//! name: Alice
//! email: alice@example.com
//! cost: 250
//! ```

use crate::QuoteError;
use quoteflow_types::OrderId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteArtifact {
	pub order_id: OrderId,
	pub name: String,
	pub email: String,
	pub cost: u32,
}

impl QuoteArtifact {
	/// File name under which the quote of `order_id` is stored.
	pub fn file_name(order_id: OrderId) -> String {
		format!("quote_{}.txt", order_id)
	}

	/// Reads an artifact back from its text form.
	pub fn parse(content: &str) -> Result<Self, QuoteError> {
		let mut order_id = None;
		let mut name = None;
		let mut email = None;
		let mut cost = None;

		for line in content.lines().filter(|line| !line.trim().is_empty()) {
			let (label, value) = line
				.split_once(':')
				.ok_or_else(|| QuoteError::Parse(format!("unlabeled line: {}", line)))?;
			let value = value.trim();
			match label.trim() {
				"id" => {
					order_id = Some(value.parse::<OrderId>().map_err(|e| {
						QuoteError::Parse(format!("invalid id '{}': {}", value, e))
					})?)
				},
				"name" => name = Some(value.to_string()),
				"email" => email = Some(value.to_string()),
				"cost" => {
					cost = Some(value.parse::<u32>().map_err(|e| {
						QuoteError::Parse(format!("invalid cost '{}': {}", value, e))
					})?)
				},
				other => return Err(QuoteError::Parse(format!("unknown label: {}", other))),
			}
		}

		let missing = |label: &str| QuoteError::Parse(format!("missing '{}' line", label));
		Ok(Self {
			order_id: order_id.ok_or_else(|| missing("id"))?,
			name: name.ok_or_else(|| missing("name"))?,
			email: email.ok_or_else(|| missing("email"))?,
			cost: cost.ok_or_else(|| missing("cost"))?,
		})
	}
}

impl fmt::Display for QuoteArtifact {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"id: {}\nname: {}\nemail: {}\ncost: {}",
			self.order_id, self.name, self.email, self.cost
		)
	}
}
