//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage, oracle) exposes one `Registry` struct per
/// implementation. The struct names the implementation as it appears in the
/// configuration and hands out the factory that builds it.
pub trait ImplementationRegistry {
	/// Name used under `implementations` in the TOML configuration,
	/// e.g. `"memory"` for `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// Factory function type of the module.
	type Factory;

	/// Returns the factory for this implementation.
	fn factory() -> Self::Factory;
}
