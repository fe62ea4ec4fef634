//! Address & interface planning.
//!
//! Turns a validated topology into concrete interface names, addresses and
//! static routes per container. The emitter consumes the resulting
//! [`AddressPlan`]; nothing here knows about the output format.

pub mod planner;
pub mod types;

// Re-export commonly used types
pub use planner::{plan, PlannerOptions};
pub use types::{
    AddressPlan, ContainerPlan, Endpoint, InterfaceRole, LinkScope, PlanError, PlanWarning,
    PlannedInterface, PlannedLink, StaticRoute,
};
