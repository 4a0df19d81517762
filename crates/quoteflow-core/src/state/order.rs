//! Order state machine implementation.
//!
//! Stage flags only move forward in pipeline order: a flag may become true
//! once every earlier flag is true. The one exception is
//! `service_realization`, which goes back to false when the client refuses
//! the realization. Rejected orders are removed and replaced by a
//! [`Rejection`] tombstone.

use once_cell::sync::Lazy;
use quoteflow_storage::{StorageError, StorageService};
use quoteflow_types::{Order, OrderId, Rejection, Stage, StageFlag, StorageKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid transition: cannot set {flag} to {value}")]
	InvalidTransition { flag: StageFlag, value: bool },
	#[error("Order not found: {0}")]
	OrderNotFound(OrderId),
	#[error("Time error: {0}")]
	TimeError(String),
}

/// Every flag that must be true before the key flag may be set.
static PREREQUISITES: Lazy<HashMap<StageFlag, Vec<StageFlag>>> = Lazy::new(|| {
	StageFlag::all()
		.map(|flag| {
			let mut chain = Vec::new();
			let mut current = flag.predecessor();
			while let Some(previous) = current {
				chain.push(previous);
				current = previous.predecessor();
			}
			(flag, chain)
		})
		.collect()
});

/// Manages order transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	fn map_storage(order_id: OrderId, error: StorageError) -> OrderStateError {
		match error {
			StorageError::NotFound => OrderStateError::OrderNotFound(order_id),
			e => OrderStateError::Storage(e.to_string()),
		}
	}

	/// Seconds since the Unix epoch.
	pub fn now() -> Result<u64, OrderStateError> {
		Ok(SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_err(|e| OrderStateError::TimeError(e.to_string()))?
			.as_secs())
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), &order_id.to_string())
			.await
			.map_err(|e| Self::map_storage(order_id, e))
	}

	/// Gets an order by ID, `None` once it has been removed.
	pub async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderStateError> {
		self.storage
			.retrieve_optional(StorageKey::Orders.as_str(), &order_id.to_string())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Stores a new order
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id.to_string(), order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Updates an order with a closure and persists it
	pub async fn update_order_with<F>(
		&self,
		order_id: OrderId,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		let mut order = self.get_order(order_id).await?;

		updater(&mut order);
		order.updated_at = Self::now()?;

		self.storage
			.update(StorageKey::Orders.as_str(), &order_id.to_string(), &order)
			.await
			.map_err(|e| Self::map_storage(order_id, e))?;

		Ok(order)
	}

	/// Sets one stage flag with validation
	pub async fn transition_flag(
		&self,
		order_id: OrderId,
		flag: StageFlag,
		value: bool,
	) -> Result<Order, OrderStateError> {
		self.transition_flag_with(order_id, flag, value, |_| {}).await
	}

	/// Sets one stage flag and applies further field updates in the same
	/// write.
	pub async fn transition_flag_with<F>(
		&self,
		order_id: OrderId,
		flag: StageFlag,
		value: bool,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		let order = self.get_order(order_id).await?;

		if !Self::is_valid_transition(&order, flag, value) {
			return Err(OrderStateError::InvalidTransition { flag, value });
		}

		self.update_order_with(order_id, |o| {
			o.flags.set(flag, value);
			updater(o);
		})
		.await
	}

	/// Checks if setting `flag` to `value` keeps the flags ordered
	fn is_valid_transition(order: &Order, flag: StageFlag, value: bool) -> bool {
		let flags = &order.flags;
		if value {
			return PREREQUISITES
				.get(&flag)
				.is_some_and(|required| required.iter().all(|f| flags.get(*f)));
		}

		// A reset may not leave a later flag standing on it.
		flag.is_resettable()
			&& PREREQUISITES
				.iter()
				.filter(|(_, required)| required.contains(&flag))
				.all(|(later, _)| !flags.get(*later))
	}

	/// Removes a rejected order and records why.
	///
	/// Removing an order that is already gone still writes the tombstone.
	pub async fn reject_order(
		&self,
		order_id: OrderId,
		stage: Stage,
	) -> Result<Rejection, OrderStateError> {
		let rejection = Rejection {
			order_id,
			stage,
			rejected_at: Self::now()?,
		};
		let id = order_id.to_string();

		self.storage
			.remove(StorageKey::Orders.as_str(), &id)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;
		self.storage
			.store(StorageKey::Rejections.as_str(), &id, &rejection)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;

		Ok(rejection)
	}

	/// Looks up the tombstone of a rejected order.
	pub async fn find_rejection(
		&self,
		order_id: OrderId,
	) -> Result<Option<Rejection>, OrderStateError> {
		self.storage
			.retrieve_optional(StorageKey::Rejections.as_str(), &order_id.to_string())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use quoteflow_storage::implementations::memory::MemoryStorage;

	async fn machine_with_order() -> OrderStateMachine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = OrderStateMachine::new(storage);
		machine
			.store_order(&Order::new(1, "A", "a@x.com", 0))
			.await
			.unwrap();
		machine
	}

	#[tokio::test]
	async fn test_flags_follow_pipeline_order() {
		let machine = machine_with_order().await;

		let err = machine
			.transition_flag(1, StageFlag::ValidatedQuoteClient, true)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			OrderStateError::InvalidTransition {
				flag: StageFlag::ValidatedQuoteClient,
				value: true
			}
		));

		for flag in StageFlag::all() {
			let order = machine.transition_flag(1, flag, true).await.unwrap();
			assert!(order.flags.get(flag));
			assert!(order.flags.is_ordered());
		}
	}

	#[tokio::test]
	async fn test_only_realization_may_reset() {
		let machine = machine_with_order().await;
		for flag in StageFlag::all() {
			machine.transition_flag(1, flag, true).await.unwrap();
		}

		assert!(machine
			.transition_flag(1, StageFlag::Validated, false)
			.await
			.is_err());
		assert!(machine
			.transition_flag(1, StageFlag::ValidatedQuoteClient, false)
			.await
			.is_err());

		let order = machine
			.transition_flag(1, StageFlag::ServiceRealization, false)
			.await
			.unwrap();
		assert!(!order.flags.service_realization);
		assert!(order.flags.validated_quote_client);
	}

	#[tokio::test]
	async fn test_transition_with_extra_fields_in_one_write() {
		let machine = machine_with_order().await;
		machine
			.transition_flag(1, StageFlag::Validated, true)
			.await
			.unwrap();

		let order = machine
			.transition_flag_with(1, StageFlag::ValidatedQuoteSupplier, true, |o| {
				o.quote_file_name = Some("quote_1.txt".into());
			})
			.await
			.unwrap();
		assert!(order.flags.validated_quote_supplier);

		let stored = machine.get_order(1).await.unwrap();
		assert_eq!(stored.quote_file_name.as_deref(), Some("quote_1.txt"));
		assert!(stored.updated_at >= stored.created_at);
	}

	#[tokio::test]
	async fn test_rejection_removes_order_and_leaves_tombstone() {
		let machine = machine_with_order().await;

		let rejection = machine
			.reject_order(1, Stage::OrderValidation)
			.await
			.unwrap();
		assert_eq!(rejection.stage, Stage::OrderValidation);

		assert!(machine.find_order(1).await.unwrap().is_none());
		assert!(matches!(
			machine.get_order(1).await,
			Err(OrderStateError::OrderNotFound(1))
		));
		assert_eq!(machine.find_rejection(1).await.unwrap(), Some(rejection));

		// Updates never resurrect a removed order.
		assert!(matches!(
			machine
				.transition_flag(1, StageFlag::Validated, true)
				.await,
			Err(OrderStateError::OrderNotFound(1))
		));
	}
}
