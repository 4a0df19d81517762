//! Common types module for the quoteflow system.
//!
//! This module defines the core data types shared by every quoteflow crate:
//! the order record and its stage flags, the pipeline stages, oracle
//! decisions, workflow events and the HTTP API payloads.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Event types for inter-component communication.
pub mod events;
/// Order record, stage flags and rejection tombstones.
pub mod order;
/// Registry trait for named, factory-built implementations.
pub mod registry;
/// Pipeline stages and oracle decisions.
pub mod stage;
/// Storage namespaces.
pub mod storage;
/// Configuration validation types for pluggable implementations.
pub mod validation;

pub use api::*;
pub use events::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use stage::*;
pub use storage::*;
pub use validation::*;
