//! Address plan types.
//!
//! The plan is derived data: it is keyed by container and connection ids and
//! recomputed from scratch on every generation pass.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::net::Ipv4Addr;

use crate::ip::{AddressError, AllocationError, InterfaceConflict, LinkBlock};
use crate::topology::ContainerType;

/// Fatal planning errors. Any of these aborts generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("{entity}: {source}")]
    InvalidAddress {
        entity: String,
        #[source]
        source: AddressError,
    },
    #[error("container {container}: address {ip} is not a usable host of {cidr}")]
    IpOutsideSubnet {
        container: String,
        ip: String,
        cidr: Ipv4Net,
    },
    #[error("subnet {subnet} ({cidr}) has no usable host addresses")]
    NoUsableAddresses { subnet: String, cidr: Ipv4Net },
    #[error("duplicate id {0} in topology")]
    DuplicateId(String),
    #[error("connection {from} -> {to}: endpoint {endpoint} does not resolve to a container")]
    UnresolvableEndpoint {
        from: String,
        to: String,
        endpoint: String,
    },
    #[error("connection {from} -> {to} links container {container} to itself")]
    SelfLink {
        from: String,
        to: String,
        container: String,
    },
    #[error(transparent)]
    LinkSpace(#[from] AllocationError),
    #[error(transparent)]
    Interface(#[from] InterfaceConflict),
}

/// Containment level that owns a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkScope {
    /// Container to container inside one subnet.
    Subnet,
    /// Gateway to gateway between two subnets of a site.
    InterSubnet,
    /// Gateway to gateway between two sites.
    InterSite,
}

impl LinkScope {
    pub fn is_point_to_point(&self) -> bool {
        !matches!(self, LinkScope::Subnet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub container: String,
    pub interface: String,
}

/// One physical link between two container interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedLink {
    pub scope: LinkScope,
    pub a: Endpoint,
    pub b: Endpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The `/30` numbering a cross-subnet link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<LinkBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InterfaceRole {
    /// Carries the container's primary address on its home subnet.
    Home,
    /// Same-subnet port without an address of its own (switch port, extra LAN link).
    Member,
    /// Numbered cross-subnet link towards `peer`.
    PointToPoint {
        peer: String,
        peer_address: Ipv4Addr,
        /// Home subnet the peer serves, reachable through this interface.
        peer_subnet: Ipv4Net,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedInterface {
    pub name: String,
    pub role: InterfaceRole,
    /// Interface address with prefix length, e.g. `10.0.1.1/24`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Net>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StaticRoute {
    pub destination: Ipv4Net,
    pub via: Ipv4Addr,
}

impl StaticRoute {
    pub fn default_via(via: Ipv4Addr) -> Self {
        Self {
            destination: Ipv4Net::default(),
            via,
        }
    }

    pub fn is_default(&self) -> bool {
        self.destination.prefix_len() == 0
    }
}

/// Everything the planner decided for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPlan {
    pub container_id: String,
    pub name: String,
    pub container_type: ContainerType,
    pub subnet_id: String,
    pub home_cidr: Ipv4Net,
    pub primary_ip: Ipv4Addr,
    /// Default gateway of the home subnet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
    /// Interfaces ordered by `ethN` index.
    pub interfaces: Vec<PlannedInterface>,
    pub routes: Vec<StaticRoute>,
}

impl ContainerPlan {
    pub fn interface(&self, name: &str) -> Option<&PlannedInterface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn home_interface(&self) -> Option<&PlannedInterface> {
        self.interfaces.iter().find(|i| i.role == InterfaceRole::Home)
    }

    /// Primary address with the home subnet's prefix length.
    pub fn primary_address(&self) -> Ipv4Net {
        Ipv4Net::new(self.primary_ip, self.home_cidr.prefix_len()).unwrap_or(self.home_cidr)
    }
}

/// Non-fatal findings. The plan is still usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlanWarning {
    /// A non-switch container has no link into its own subnet, so its
    /// primary address is not bound to any interface.
    Unattached { container: String },
    /// A host's subnet has no gateway, so it gets no default route.
    NoGateway { container: String },
}

/// Output of the address & interface planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressPlan {
    /// Containers in containment order (site, subnet, container).
    pub containers: Vec<ContainerPlan>,
    /// Links in planning order: subnet links, then inter-subnet, then inter-site.
    pub links: Vec<PlannedLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PlanWarning>,
}

impl AddressPlan {
    pub fn container(&self, id: &str) -> Option<&ContainerPlan> {
        self.containers.iter().find(|c| c.container_id == id)
    }

    /// Links numbered out of the point-to-point block, in allocation order.
    pub fn point_to_point_links(&self) -> impl Iterator<Item = &PlannedLink> {
        self.links.iter().filter(|l| l.block.is_some())
    }
}
