//! Request handling behind the HTTP routes.

pub mod decision;
pub mod order;
