//! Read model over stored orders.
//!
//! Status queries never touch the pipeline; they only interpret the stage
//! flags of whatever is currently stored.

use quoteflow_types::{Order, Rejection, StageStatus};
use std::fmt;
use std::str::FromStr;

/// A customer-facing progress checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
	/// The order itself was accepted.
	Validation,
	/// The quote was accepted by the supplier.
	Quote,
	/// The service was performed.
	Realization,
}

impl Checkpoint {
	pub fn as_str(&self) -> &'static str {
		match self {
			Checkpoint::Validation => "validation",
			Checkpoint::Quote => "quote",
			Checkpoint::Realization => "realization",
		}
	}

	/// Maps the stored order, or its absence, to a status.
	pub fn status(&self, order: Option<&Order>) -> StageStatus {
		let Some(order) = order else {
			return StageStatus::Invalidated;
		};

		let flags = &order.flags;
		let done = match self {
			Checkpoint::Validation => flags.validated,
			Checkpoint::Quote => flags.validated && flags.validated_quote_supplier,
			Checkpoint::Realization => flags.service_realization,
		};

		if done {
			StageStatus::Done
		} else {
			StageStatus::Pending
		}
	}
}

impl fmt::Display for Checkpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Checkpoint {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"validation" => Ok(Checkpoint::Validation),
			"quote" => Ok(Checkpoint::Quote),
			"realization" => Ok(Checkpoint::Realization),
			other => Err(format!("Unknown checkpoint: {}", other)),
		}
	}
}

/// Result of looking up an order by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
	Active(Order),
	/// The order was removed by a rejection.
	Rejected(Rejection),
	/// No such order was ever seen, or its tombstone expired.
	NotFound,
}
