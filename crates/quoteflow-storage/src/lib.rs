//! Storage module for the quoteflow system.
//!
//! This module provides the persistent key-value store that holds order
//! records, rejection tombstones and identifier sequences. Backends implement
//! the byte-level [`StorageInterface`]; the rest of the system talks to the
//! typed [`StorageService`].

use async_trait::async_trait;
use quoteflow_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends store opaque bytes under string keys of the form
/// `namespace:id`. A single `set_bytes` call must replace the value
/// atomically so readers never observe a partial record.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Overwrites the value of a live key, failing with `NotFound` when the
	/// key is absent. The check and the write must be atomic with respect to
	/// `delete`, so a removed key is never written back.
	async fn replace_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key. Deleting a missing
	/// key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries and returns how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns `(name, factory)` pairs used by the service's factory registry.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level storage service that provides typed operations.
///
/// Values are serialized to JSON and stored under `namespace:id`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
	/// Serializes sequence increments within this process.
	sequence_lock: Mutex<()>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			sequence_lock: Mutex::new(()),
		}
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value with optional time-to-live.
	///
	/// A `None` TTL lets the backend apply its per-namespace default.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves a value, mapping a missing key to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Updates an existing value in storage.
	///
	/// Unlike [`store`](Self::store) this fails with `NotFound` when the key
	/// does not exist, so a deleted order is never resurrected by a late
	/// write, even one racing the removal.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.replace_bytes(&Self::key(namespace, id), bytes)
			.await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Increments the named sequence and returns the new value.
	///
	/// Sequences start at 1. Increments are serialized within one
	/// `StorageService`; the backend must not be shared between processes.
	pub async fn next_sequence(&self, name: &str) -> Result<u64, StorageError> {
		let _guard = self.sequence_lock.lock().await;
		let namespace = StorageKey::Sequences.as_str();
		let current: u64 = self
			.retrieve_optional(namespace, name)
			.await?
			.unwrap_or(0);
		let next = current + 1;
		self.store(namespace, name, &next).await?;
		Ok(next)
	}

	/// Removes expired entries from storage.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;
	use std::sync::Arc;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Record {
		value: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_store_and_retrieve() {
		let storage = service();
		storage.store("orders", "1", &Record { value: 3 }).await.unwrap();

		let record: Record = storage.retrieve("orders", "1").await.unwrap();
		assert_eq!(record, Record { value: 3 });
		assert!(storage.exists("orders", "1").await.unwrap());
		assert!(!storage.exists("rejections", "1").await.unwrap());
	}

	#[tokio::test]
	async fn test_update_requires_existing_key() {
		let storage = service();
		let result = storage.update("orders", "9", &Record { value: 1 }).await;
		assert!(matches!(result, Err(StorageError::NotFound)));
		assert!(!storage.exists("orders", "9").await.unwrap());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_update_racing_remove_never_resurrects() {
		let storage = Arc::new(service());
		for round in 0..50u32 {
			let id = round.to_string();
			storage.store("orders", &id, &Record { value: 0 }).await.unwrap();

			let updater = {
				let storage = storage.clone();
				let id = id.clone();
				tokio::spawn(async move {
					storage
						.update("orders", &id, &Record { value: round })
						.await
				})
			};
			storage.remove("orders", &id).await.unwrap();

			match updater.await.unwrap() {
				Ok(()) | Err(StorageError::NotFound) => {},
				Err(e) => panic!("unexpected error: {}", e),
			}
			// Whichever ran first, the removal has the last word.
			assert!(!storage.exists("orders", &id).await.unwrap());
		}
	}

	#[tokio::test]
	async fn test_retrieve_optional_maps_missing_to_none() {
		let storage = service();
		let missing: Option<Record> = storage.retrieve_optional("orders", "1").await.unwrap();
		assert!(missing.is_none());

		storage.store("orders", "1", &Record { value: 2 }).await.unwrap();
		storage.remove("orders", "1").await.unwrap();
		let removed: Option<Record> = storage.retrieve_optional("orders", "1").await.unwrap();
		assert!(removed.is_none());
	}

	#[tokio::test]
	async fn test_sequences_are_unique_under_concurrency() {
		let storage = Arc::new(service());
		let mut handles = Vec::new();
		for _ in 0..20 {
			let storage = storage.clone();
			handles.push(tokio::spawn(
				async move { storage.next_sequence("orders").await.unwrap() },
			));
		}

		let mut ids = Vec::new();
		for handle in handles {
			ids.push(handle.await.unwrap());
		}
		ids.sort_unstable();
		assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
	}
}
