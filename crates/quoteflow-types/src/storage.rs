//! Storage-related types for the quoteflow system.

use std::str::FromStr;

/// Storage namespaces for the different record collections.
///
/// This enum replaces string literals in storage calls with strongly typed
/// variants. Backends use the namespace to pick per-collection settings such
/// as TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Live order records
	Orders,
	/// Tombstones of rejected orders
	Rejections,
	/// Identifier sequences
	Sequences,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Rejections => "rejections",
			StorageKey::Sequences => "sequences",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::Rejections, Self::Sequences].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
