//! Functional role of a node.

use serde::Serialize;

use crate::topology::ContainerType;

/// How a container behaves on the emulated network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End system: one addressed interface and a default route.
    Host,
    /// Layer-2 bridge unifying the subnet's broadcast domain.
    Switch,
    /// Forwarding node holding point-to-point links and static routes.
    Router,
}

impl Role {
    pub fn of(container_type: ContainerType) -> Self {
        match container_type {
            ContainerType::Router | ContainerType::Firewall => Role::Router,
            ContainerType::Switch => Role::Switch,
            ContainerType::WebServer
            | ContainerType::FileServer
            | ContainerType::Plc
            | ContainerType::Workstation => Role::Host,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Switch => "switch",
            Role::Router => "router",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_mapping() {
        assert_eq!(Role::of(ContainerType::Firewall), Role::Router);
        assert_eq!(Role::of(ContainerType::Switch), Role::Switch);
        assert_eq!(Role::of(ContainerType::Plc), Role::Host);
        assert_eq!(Role::of(ContainerType::WebServer).as_str(), "host");
    }
}
