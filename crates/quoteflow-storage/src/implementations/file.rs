//! File-based storage backend.
//!
//! Every key is one file under the configured directory. Files carry a small
//! binary header with the expiry time so rejection tombstones can age out.
//! Writes go to a temporary file that is renamed into place, so a crash
//! never leaves a half-written order behind.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use quoteflow_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::Mutex;

fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::ZERO)
		.as_secs()
}

/// Fixed-size file header.
///
/// Layout (32 bytes):
/// - `[0..4]`: magic `QFLS`
/// - `[4..6]`: version, u16 little-endian
/// - `[6..14]`: expiry, u64 little-endian unix seconds, 0 = never
/// - `[14..32]`: reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"QFLS";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			unix_now().saturating_add(ttl.as_secs())
		};

		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing file header".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);

		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires_bytes),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && unix_now() >= self.expires_at
	}
}

/// Namespaces whose entries may age out. Orders and sequences are never
/// expired: losing either would drop live orders or reuse ids.
const EXPIRING_NAMESPACES: [StorageKey; 1] = [StorageKey::Rejections];

fn ttl_field(storage_key: StorageKey) -> String {
	format!("ttl_{}", storage_key.as_str())
}

/// Default TTLs per storage namespace.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_<namespace>` entries (seconds) from the backend table.
	fn from_config(config: &toml::Value) -> Self {
		let ttls = EXPIRING_NAMESPACES
			.into_iter()
			.filter_map(|storage_key| {
				config
					.get(ttl_field(storage_key))
					.and_then(|v| v.as_integer())
					.map(|secs| (storage_key, Duration::from_secs(secs.max(0) as u64)))
			})
			.collect();

		Self { ttls }
	}

	fn get_ttl(&self, storage_key: StorageKey) -> Duration {
		self.ttls
			.get(&storage_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
	/// Held by conditional writes and deletes so they never interleave.
	removal_lock: Mutex<()>,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
			removal_lock: Mutex::new(()),
		}
	}

	/// Maps a key to a filesystem-safe path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	/// Default TTL of the key's namespace (`orders:12` -> `orders`).
	fn get_ttl_for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<StorageKey>().ok())
			.map(|storage_key| self.ttl_config.get_ttl(storage_key))
			.unwrap_or(Duration::ZERO)
	}

	/// Writes the record to a temporary file and renames it into place.
	async fn write_file(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));
		let header = FileHeader::new(ttl);

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(&value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}

			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
					continue;
				},
			};

			match FileHeader::deserialize(&data) {
				Ok(header) if header.is_expired() => {
					if let Err(e) = fs::remove_file(&path).await {
						tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
					} else {
						removed += 1;
					}
				},
				Ok(_) => {},
				Err(e) => tracing::debug!("Skipping file {:?}: {}", path, e),
			}
		}

		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::deserialize(&data)?;
		if header.is_expired() {
			return Err(StorageError::NotFound);
		}

		Ok(data[FileHeader::SIZE..].to_vec())
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.write_file(key, value, ttl).await
	}

	async fn replace_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let _guard = self.removal_lock.lock().await;
		if !self.exists(key).await? {
			return Err(StorageError::NotFound);
		}
		self.write_file(key, value, None).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.removal_lock.lock().await;
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];
		for storage_key in EXPIRING_NAMESPACES {
			optional_fields.push(Field::new(
				ttl_field(storage_key),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}

		if let Some(table) = config.as_table() {
			let allowed: Vec<String> = EXPIRING_NAMESPACES.into_iter().map(ttl_field).collect();
			if let Some(field) = table
				.keys()
				.find(|key| key.starts_with("ttl_") && !allowed.contains(key))
			{
				return Err(ValidationError::InvalidValue {
					field: field.clone(),
					message: format!("only {} may expire", allowed.join(", ")),
				});
			}
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
/// - `ttl_rejections`: tombstone TTL in seconds (default: 0, never expire)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir, ttl_config: TtlConfig) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), ttl_config)
	}

	#[test]
	fn test_header_layout() {
		let header = FileHeader::new(Duration::ZERO);
		let bytes = header.serialize();
		assert_eq!(&bytes[0..4], b"QFLS");
		assert_eq!(FileHeader::deserialize(&bytes).unwrap(), header);
		assert!(!header.is_expired());
	}

	#[tokio::test]
	async fn test_round_trip_and_delete() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir, TtlConfig::default());

		storage
			.set_bytes("orders:1", b"payload".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"payload");
		assert!(storage.exists("orders:1").await.unwrap());
		assert!(dir.path().join("orders_1.bin").exists());
		assert!(!dir.path().join("orders_1.tmp").exists());

		storage.delete("orders:1").await.unwrap();
		assert!(!storage.exists("orders:1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_replace_only_touches_existing_keys() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir, TtlConfig::default());

		assert!(matches!(
			storage.replace_bytes("orders:2", b"late".to_vec()).await,
			Err(StorageError::NotFound)
		));
		assert!(!dir.path().join("orders_2.bin").exists());

		storage
			.set_bytes("orders:2", b"first".to_vec(), None)
			.await
			.unwrap();
		storage
			.replace_bytes("orders:2", b"second".to_vec())
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("orders:2").await.unwrap(), b"second");

		storage.delete("orders:2").await.unwrap();
		assert!(storage
			.replace_bytes("orders:2", b"third".to_vec())
			.await
			.is_err());
		assert!(!storage.exists("orders:2").await.unwrap());
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_cleaned() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir, TtlConfig::default());

		// Write a record whose expiry is already in the past.
		let header = FileHeader {
			version: FileHeader::VERSION,
			expires_at: 1,
		};
		let mut data = header.serialize().to_vec();
		data.extend_from_slice(b"old");
		std::fs::write(dir.path().join("rejections_4.bin"), data).unwrap();

		storage
			.set_bytes("orders:5", b"live".to_vec(), None)
			.await
			.unwrap();

		assert!(!storage.exists("rejections:4").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(!dir.path().join("rejections_4.bin").exists());
		assert!(storage.exists("orders:5").await.unwrap());
	}

	#[test]
	fn test_namespace_ttl_lookup() {
		let config: toml::Value = toml::from_str("ttl_rejections = 60").unwrap();
		let storage = FileStorage::new(PathBuf::from("/unused"), TtlConfig::from_config(&config));

		assert_eq!(storage.get_ttl_for_key("rejections:3"), Duration::from_secs(60));
		assert_eq!(storage.get_ttl_for_key("orders:3"), Duration::ZERO);
		assert_eq!(storage.get_ttl_for_key("unknown:3"), Duration::ZERO);
	}

	#[test]
	fn test_factory_validates_ttl() {
		let config: toml::Value = toml::from_str("ttl_rejections = -5").unwrap();
		assert!(create_storage(&config).is_err());

		let config: toml::Value = toml::from_str("ttl_rejections = 604800").unwrap();
		assert!(create_storage(&config).is_ok());
	}

	#[test]
	fn test_orders_and_sequences_cannot_expire() {
		for field in ["ttl_orders", "ttl_sequences"] {
			let config: toml::Value = toml::from_str(&format!("{} = 1", field)).unwrap();
			match FileStorageSchema.validate(&config) {
				Err(ValidationError::InvalidValue { field: rejected, .. }) => {
					assert_eq!(rejected, field)
				},
				other => panic!("{} accepted: {:?}", field, other),
			}
			assert!(matches!(
				create_storage(&config),
				Err(StorageError::Configuration(_))
			));
		}
	}

	#[tokio::test]
	async fn test_sequences_survive_cleanup() {
		let dir = TempDir::new().unwrap();
		let config: toml::Value = toml::from_str("ttl_rejections = 1").unwrap();
		let storage = storage(&dir, TtlConfig::from_config(&config));

		storage
			.set_bytes("sequences:orders", 1u64.to_le_bytes().to_vec(), None)
			.await
			.unwrap();
		storage
			.set_bytes("orders:1", b"live".to_vec(), None)
			.await
			.unwrap();

		let header = FileHeader::deserialize(
			&std::fs::read(dir.path().join("sequences_orders.bin")).unwrap(),
		)
		.unwrap();
		assert_eq!(header.expires_at, 0);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
		assert!(storage.exists("sequences:orders").await.unwrap());
		assert!(storage.exists("orders:1").await.unwrap());
	}
}
