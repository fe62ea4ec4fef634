//! Per-node configuration.
//!
//! Maps container types onto roles and renders each container's share of
//! the address plan into an image, start-up commands and bind mounts.

pub mod firewall;
pub mod role;
pub mod synth;

// Re-export commonly used types
pub use firewall::{Action, FirewallRule, Protocol};
pub use role::Role;
pub use synth::{image_for, synthesize, Degraded, NodeConfig};
