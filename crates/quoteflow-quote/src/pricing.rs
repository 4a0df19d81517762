//! Cost computation for generated quotes.

use crate::QuoteError;
use quoteflow_types::OrderId;
use rand::Rng;

/// Default inclusive cost range.
pub const DEFAULT_MIN_COST: u32 = 0;
pub const DEFAULT_MAX_COST: u32 = 400;

/// Computes the cost written into a quote.
pub trait PricingStrategy: Send + Sync {
	fn price(&self, order_id: OrderId) -> u32;
}

/// Uniformly random integer cost within an inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct RandomPricing {
	min: u32,
	max: u32,
}

impl RandomPricing {
	pub fn new(min: u32, max: u32) -> Result<Self, QuoteError> {
		if min > max {
			return Err(QuoteError::Configuration(format!(
				"min cost {} exceeds max cost {}",
				min, max
			)));
		}
		Ok(Self { min, max })
	}
}

impl Default for RandomPricing {
	fn default() -> Self {
		Self {
			min: DEFAULT_MIN_COST,
			max: DEFAULT_MAX_COST,
		}
	}
}

impl PricingStrategy for RandomPricing {
	fn price(&self, _order_id: OrderId) -> u32 {
		rand::rng().random_range(self.min..=self.max)
	}
}

/// Same cost for every order.
#[derive(Debug, Clone, Copy)]
pub struct FixedPricing(pub u32);

impl PricingStrategy for FixedPricing {
	fn price(&self, _order_id: OrderId) -> u32 {
		self.0
	}
}
