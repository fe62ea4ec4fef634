//! Topology model.
//!
//! This module contains the editable source of truth: sites holding subnets
//! holding containers, the connections at each containment level, and the
//! edit operations that keep the model's invariants while it changes.

pub mod edits;
pub mod ids;
pub mod types;

// Re-export key types and functions for easier access
pub use edits::{ContainerPatch, Edit, EditError, Outcome, SitePatch, SubnetPatch};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use types::{
    Connection, Container, ContainerStatus, ContainerType, Position, Site, Subnet, Topology,
};
