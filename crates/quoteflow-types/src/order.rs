//! Order record types.
//!
//! An order lives in the store for as long as it is alive in the pipeline.
//! Rejection deletes it and leaves a [`Rejection`] tombstone behind.

use crate::{Stage, StageFlag};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the store when an order is created.
pub type OrderId = u64;

/// Progress markers of an order, one per gated stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
	#[serde(default)]
	pub validated: bool,
	#[serde(default)]
	pub validated_quote_supplier: bool,
	#[serde(default)]
	pub validated_quote_client: bool,
	#[serde(default)]
	pub service_realization: bool,
}

impl StageFlags {
	pub fn get(&self, flag: StageFlag) -> bool {
		match flag {
			StageFlag::Validated => self.validated,
			StageFlag::ValidatedQuoteSupplier => self.validated_quote_supplier,
			StageFlag::ValidatedQuoteClient => self.validated_quote_client,
			StageFlag::ServiceRealization => self.service_realization,
		}
	}

	pub fn set(&mut self, flag: StageFlag, value: bool) {
		match flag {
			StageFlag::Validated => self.validated = value,
			StageFlag::ValidatedQuoteSupplier => self.validated_quote_supplier = value,
			StageFlag::ValidatedQuoteClient => self.validated_quote_client = value,
			StageFlag::ServiceRealization => self.service_realization = value,
		}
	}

	/// Returns true when no flag is set while its predecessor is unset.
	pub fn is_ordered(&self) -> bool {
		StageFlag::all().all(|flag| {
			!self.get(flag) || flag.predecessor().is_none_or(|prev| self.get(prev))
		})
	}
}

/// An order tracked through the approval pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: OrderId,
	/// Customer name captured at creation.
	pub name: String,
	/// Customer email captured at creation.
	pub email: String,
	/// Pipeline progress.
	#[serde(flatten)]
	pub flags: StageFlags,
	/// Quote artifact produced by quote generation.
	#[serde(default)]
	pub quote_file_name: Option<String>,
	/// Number of times the service has been performed.
	#[serde(default)]
	pub realization_attempts: u32,
	/// Timestamp when this order was created.
	pub created_at: u64,
	/// Timestamp when this order was last updated.
	pub updated_at: u64,
}

impl Order {
	pub fn new(id: OrderId, name: impl Into<String>, email: impl Into<String>, now: u64) -> Self {
		Self {
			id,
			name: name.into(),
			email: email.into(),
			flags: StageFlags::default(),
			quote_file_name: None,
			realization_attempts: 0,
			created_at: now,
			updated_at: now,
		}
	}
}

/// Tombstone left behind when a stage rejects an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
	pub order_id: OrderId,
	/// Stage whose decision removed the order.
	pub stage: Stage,
	pub rejected_at: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_flags_are_ordered() {
		assert!(StageFlags::default().is_ordered());
	}

	#[test]
	fn test_out_of_order_flags_detected() {
		let flags = StageFlags {
			validated_quote_client: true,
			..Default::default()
		};
		assert!(!flags.is_ordered());
	}

	#[test]
	fn test_order_serializes_flags_flat() {
		let mut order = Order::new(7, "A", "a@x.com", 100);
		order.flags.set(StageFlag::Validated, true);

		let json = serde_json::to_value(&order).unwrap();
		assert_eq!(json["validated"], true);
		assert_eq!(json["validated_quote_supplier"], false);
		assert!(json["quote_file_name"].is_null());

		let back: Order = serde_json::from_value(json).unwrap();
		assert_eq!(back, order);
	}
}
