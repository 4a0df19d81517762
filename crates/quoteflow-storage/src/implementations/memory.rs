//! In-memory storage backend.
//!
//! Useful for tests and for running the pipeline without persistence.
//! Expiry is tracked against the tokio clock, so paused-time tests can
//! advance past a TTL.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use quoteflow_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|deadline| deadline > now)
	}
}

/// Records held in a map keyed by `namespace:id`.
pub struct MemoryStorage {
	entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let entries = self.entries.read().await;
		entries
			.get(key)
			.filter(|entry| entry.is_live(Instant::now()))
			.map(|entry| entry.value.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		// A zero TTL means the entry never expires, as in the file backend.
		let expires_at = ttl
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| Instant::now() + ttl);
		self.entries
			.write()
			.await
			.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn replace_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut entries = self.entries.write().await;
		match entries.get_mut(key) {
			Some(entry) if entry.is_live(Instant::now()) => {
				entry.value = value;
				Ok(())
			},
			_ => Err(StorageError::NotFound),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let entries = self.entries.read().await;
		Ok(entries
			.get(key)
			.is_some_and(|entry| entry.is_live(Instant::now())))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|_, entry| entry.is_live(now));
		Ok(before - entries.len())
	}
}

/// The memory backend takes no settings.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:1";
		let value = b"{\"id\":1}".to_vec();
		storage.set_bytes(key, value.clone(), None).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));

		// Deleting twice is fine.
		storage.delete(key).await.unwrap();
	}

	#[tokio::test]
	async fn test_overwrite() {
		let storage = MemoryStorage::new();

		storage.set_bytes("k", b"one".to_vec(), None).await.unwrap();
		storage.set_bytes("k", b"two".to_vec(), None).await.unwrap();
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"two".to_vec());
	}

	#[tokio::test(start_paused = true)]
	async fn test_replace_keeps_expiry_and_skips_missing_keys() {
		let storage = MemoryStorage::new();
		assert!(matches!(
			storage.replace_bytes("orders:1", b"late".to_vec()).await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("orders:1").await.unwrap());

		storage
			.set_bytes("rejections:1", b"one".to_vec(), Some(Duration::from_secs(10)))
			.await
			.unwrap();
		storage
			.replace_bytes("rejections:1", b"two".to_vec())
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("rejections:1").await.unwrap(), b"two".to_vec());

		tokio::time::advance(Duration::from_secs(11)).await;
		assert!(matches!(
			storage.replace_bytes("rejections:1", b"three".to_vec()).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_entries_expire() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("rejections:1", b"gone".to_vec(), Some(Duration::from_secs(60)))
			.await
			.unwrap();
		storage
			.set_bytes("orders:2", b"kept".to_vec(), Some(Duration::ZERO))
			.await
			.unwrap();

		tokio::time::advance(Duration::from_secs(30)).await;
		assert!(storage.exists("rejections:1").await.unwrap());

		tokio::time::advance(Duration::from_secs(31)).await;
		assert!(matches!(
			storage.get_bytes("rejections:1").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert_eq!(storage.get_bytes("orders:2").await.unwrap(), b"kept".to_vec());
	}

	#[test]
	fn test_factory_rejects_non_table() {
		assert!(create_storage(&toml::Value::Integer(1)).is_err());
	}
}
