//! State management for orders moving through the pipeline.
//!
//! This module provides the state machine that guards stage flag
//! transitions and persists order updates and rejections.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};
