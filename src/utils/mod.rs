//! Shared utilities: topology validation.

pub mod validation;

pub use validation::{validate_addressing, validate_connections, validate_topology, validate_unique_ids};
