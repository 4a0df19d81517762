//! Pipeline stages and approval decisions.
//!
//! The pipeline is a fixed sequence of stages. Every stage except
//! service realization is gated by a decision from the approval oracle.

use crate::OrderId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One gated step of the order pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	/// The order itself is checked by the supplier.
	OrderValidation,
	/// A quote is generated and checked by the supplier.
	QuoteSupplierValidation,
	/// The client accepts or refuses the validated quote.
	QuoteClientEvaluation,
	/// The service is performed. No decision is involved.
	ServiceRealization,
	/// The client confirms the service was performed as agreed.
	RealizationValidation,
}

impl Stage {
	/// Returns the stage every new order starts with.
	pub fn first() -> Self {
		Stage::OrderValidation
	}

	/// Returns the string representation used in logs, URLs and storage.
	pub fn as_str(&self) -> &'static str {
		match self {
			Stage::OrderValidation => "order_validation",
			Stage::QuoteSupplierValidation => "quote_supplier_validation",
			Stage::QuoteClientEvaluation => "quote_client_evaluation",
			Stage::ServiceRealization => "service_realization",
			Stage::RealizationValidation => "realization_validation",
		}
	}

	/// Returns an iterator over all stages in pipeline order.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::OrderValidation,
			Self::QuoteSupplierValidation,
			Self::QuoteClientEvaluation,
			Self::ServiceRealization,
			Self::RealizationValidation,
		]
		.into_iter()
	}

	/// Stage scheduled once this one has been approved.
	///
	/// `None` means the workflow is complete.
	pub fn next(&self) -> Option<Self> {
		match self {
			Stage::OrderValidation => Some(Stage::QuoteSupplierValidation),
			Stage::QuoteSupplierValidation => Some(Stage::QuoteClientEvaluation),
			Stage::QuoteClientEvaluation => Some(Stage::ServiceRealization),
			Stage::ServiceRealization => Some(Stage::RealizationValidation),
			Stage::RealizationValidation => None,
		}
	}

	/// Whether the stage waits on the approval oracle.
	pub fn requires_decision(&self) -> bool {
		!matches!(self, Stage::ServiceRealization)
	}

	/// Flag set to true when the stage resolves successfully.
	pub fn completion_flag(&self) -> Option<StageFlag> {
		match self {
			Stage::OrderValidation => Some(StageFlag::Validated),
			Stage::QuoteSupplierValidation => Some(StageFlag::ValidatedQuoteSupplier),
			Stage::QuoteClientEvaluation => Some(StageFlag::ValidatedQuoteClient),
			Stage::ServiceRealization => Some(StageFlag::ServiceRealization),
			Stage::RealizationValidation => None,
		}
	}

	/// Flags that must already be true before the stage may run.
	pub fn required_flags(&self) -> &'static [StageFlag] {
		match self {
			Stage::OrderValidation => &[],
			Stage::QuoteSupplierValidation => &[StageFlag::Validated],
			Stage::QuoteClientEvaluation => {
				&[StageFlag::Validated, StageFlag::ValidatedQuoteSupplier]
			},
			Stage::ServiceRealization => &[
				StageFlag::Validated,
				StageFlag::ValidatedQuoteSupplier,
				StageFlag::ValidatedQuoteClient,
			],
			Stage::RealizationValidation => &[
				StageFlag::Validated,
				StageFlag::ValidatedQuoteSupplier,
				StageFlag::ValidatedQuoteClient,
				StageFlag::ServiceRealization,
			],
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Stage {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Stage::all()
			.find(|stage| stage.as_str() == s)
			.ok_or_else(|| format!("Unknown stage: {}", s))
	}
}

/// Boolean progress markers persisted on the order, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFlag {
	Validated,
	ValidatedQuoteSupplier,
	ValidatedQuoteClient,
	ServiceRealization,
}

impl StageFlag {
	/// Returns the field name of the flag.
	pub fn as_str(&self) -> &'static str {
		match self {
			StageFlag::Validated => "validated",
			StageFlag::ValidatedQuoteSupplier => "validated_quote_supplier",
			StageFlag::ValidatedQuoteClient => "validated_quote_client",
			StageFlag::ServiceRealization => "service_realization",
		}
	}

	/// Returns an iterator over all flags in pipeline order.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Validated,
			Self::ValidatedQuoteSupplier,
			Self::ValidatedQuoteClient,
			Self::ServiceRealization,
		]
		.into_iter()
	}

	/// The flag that must be true before this one may be set.
	pub fn predecessor(&self) -> Option<Self> {
		match self {
			StageFlag::Validated => None,
			StageFlag::ValidatedQuoteSupplier => Some(StageFlag::Validated),
			StageFlag::ValidatedQuoteClient => Some(StageFlag::ValidatedQuoteSupplier),
			StageFlag::ServiceRealization => Some(StageFlag::ValidatedQuoteClient),
		}
	}

	/// Whether the flag may go back from true to false.
	pub fn is_resettable(&self) -> bool {
		matches!(self, StageFlag::ServiceRealization)
	}
}

impl fmt::Display for StageFlag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Answer returned by the approval oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
	Approve,
	Reject,
	/// No usable answer: malformed input, or no answer within the timeout.
	Indeterminate,
}

impl Decision {
	/// Interprets free-form operator input.
	///
	/// `ok` approves and `non` rejects, ignoring case and surrounding
	/// whitespace. Anything else is indeterminate.
	pub fn from_input(input: &str) -> Self {
		let input = input.trim();
		if input.eq_ignore_ascii_case("ok") {
			Decision::Approve
		} else if input.eq_ignore_ascii_case("non") {
			Decision::Reject
		} else {
			Decision::Indeterminate
		}
	}

	pub fn is_definitive(&self) -> bool {
		!matches!(self, Decision::Indeterminate)
	}
}

/// Context handed to the oracle for one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
	pub order_id: OrderId,
	pub stage: Stage,
	pub name: String,
	pub email: String,
	/// Quote artifact under review, when one exists.
	pub quote_file_name: Option<String>,
}

impl DecisionRequest {
	/// Human-readable question for interactive oracles.
	pub fn prompt(&self) -> String {
		match self.stage {
			Stage::OrderValidation => format!(
				"Check order {}. Type 'ok' to validate, 'non' to invalidate: ",
				self.order_id
			),
			Stage::QuoteSupplierValidation => format!(
				"Check quote {} ({}). Type 'ok' to validate, 'non' to invalidate: ",
				self.order_id,
				self.quote_file_name.as_deref().unwrap_or("no file")
			),
			Stage::QuoteClientEvaluation => format!(
				"The quote for order {} was generated and validated, please review it and type 'ok' to accept, 'non' to refuse: ",
				self.order_id
			),
			Stage::ServiceRealization | Stage::RealizationValidation => format!(
				"Was the service for order {} performed as agreed? Type 'ok' to validate, 'non' to invalidate: ",
				self.order_id
			),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_decision_from_input() {
		assert_eq!(Decision::from_input("ok"), Decision::Approve);
		assert_eq!(Decision::from_input("  OK\n"), Decision::Approve);
		assert_eq!(Decision::from_input("non"), Decision::Reject);
		assert_eq!(Decision::from_input("Non"), Decision::Reject);
		assert_eq!(Decision::from_input("maybe"), Decision::Indeterminate);
		assert_eq!(Decision::from_input(""), Decision::Indeterminate);
	}

	#[test]
	fn test_stage_sequence_visits_every_stage_once() {
		let mut visited = vec![Stage::first()];
		while let Some(next) = visited.last().and_then(Stage::next) {
			visited.push(next);
		}
		assert_eq!(visited, Stage::all().collect::<Vec<_>>());
	}

	#[test]
	fn test_required_flags_follow_flag_order() {
		for stage in Stage::all() {
			for flag in stage.required_flags() {
				if let Some(prev) = flag.predecessor() {
					assert!(
						stage.required_flags().contains(&prev),
						"{} requires {} without {}",
						stage,
						flag,
						prev
					);
				}
			}
		}
	}

	#[test]
	fn test_stage_round_trips_through_str() {
		for stage in Stage::all() {
			assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
		}
		assert!("unknown".parse::<Stage>().is_err());
	}

	#[test]
	fn test_only_realization_skips_oracle() {
		let without: Vec<_> = Stage::all().filter(|s| !s.requires_decision()).collect();
		assert_eq!(without, vec![Stage::ServiceRealization]);
	}
}
