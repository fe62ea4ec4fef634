//! IP address and interface allocation.
//!
//! This module holds the building blocks the address planner composes:
//! subnet host arithmetic, the point-to-point `/30` allocator, and the
//! per-container interface name registry.

pub mod allocator;
pub mod cidr;
pub mod registry;

// Re-export commonly used types
pub use allocator::{AllocationError, LinkAllocator, LinkBlock};
pub use cidr::{parse_cidr, parse_ip, usable_hosts, AddressError};
pub use registry::{InterfaceConflict, InterfaceRegistry};
