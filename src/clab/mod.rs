//! # Containerlab output
//!
//! This module is the bridge between the compiled topology and the
//! containerlab runner: the descriptor data structures, the deterministic
//! naming contract the runner relies on, the emitter that assembles a
//! descriptor from the plan, and the importer that reverses one.
//!
//! ## Example Generated Structure
//!
//! ```yaml
//! name: plant-deadbeef
//! mgmt:
//!   network: ae3gis-mgmt-deadbeef
//!   ipv4-subnet: 100.86.190.0/24
//! topology:
//!   nodes:
//!     r1:
//!       kind: linux
//!       image: frrouting/frr:latest
//!       exec:
//!         - ip addr add 10.0.1.1/24 dev eth1
//!         - sysctl -w net.ipv4.ip_forward=1
//!   links:
//!     - endpoints: ["s1:eth1", "r1:eth1"]
//! ```

pub mod emitter;
pub mod import;
pub mod naming;
pub mod types;

// Re-export commonly used types for convenience
pub use emitter::{build_descriptor, management, to_yaml, DeploymentTarget};
pub use import::import;
pub use naming::{
    container_id_from_runtime_name, deployment_name, management_ipv4_subnet,
    management_ipv6_subnet, management_network_name, runtime_container_name, NamingError,
};
pub use types::{ClabConfig, ClabLink, ClabMgmt, ClabNode, ClabTopology};
