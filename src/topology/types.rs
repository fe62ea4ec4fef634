//! Topology data model.
//!
//! A topology is a strict containment tree: sites own subnets, subnets own
//! containers. Connections live at the level that owns both endpoints:
//! container links inside a subnet, subnet links inside a site, and site
//! links on the topology itself. Field names follow the JSON shape stored by
//! the editor (`siteConnections`, `fromInterface`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::node::firewall::FirewallRule;

/// Functional type of a container.
///
/// This is a closed set: adding a variant forces every role, image and
/// configuration match in the crate to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerType {
    Router,
    Firewall,
    Switch,
    WebServer,
    FileServer,
    Plc,
    Workstation,
}

impl ContainerType {
    /// Router and firewall containers can represent a subnet or site on
    /// cross-level links.
    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::Router | Self::Firewall)
    }

    /// The wire name used in topology JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Firewall => "firewall",
            Self::Switch => "switch",
            Self::WebServer => "web-server",
            Self::FileServer => "file-server",
            Self::Plc => "plc",
            Self::Workstation => "workstation",
        }
    }
}

impl std::fmt::Display for ContainerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime status reported by the container runner. Never compiler input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Paused,
}

/// Display-only canvas position of a site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// An edge between two endpoints.
///
/// Inside a subnet `from`/`to` are container ids. On subnet and site links
/// they are subnet or site ids, and `from_container`/`to_container` cache the
/// gateway container chosen to represent each side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_container: Option<String>,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    /// Undirected endpoint comparison: `(a, b)` and `(b, a)` are the same edge.
    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// True if either endpoint names `id`.
    pub fn touches(&self, id: &str) -> bool {
        self.from == id || self.to == id
    }
}

/// A single emulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    /// Primary (home subnet) IPv4 address, without prefix length.
    pub ip: String,
    /// containerlab node kind; the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Descriptive image hint from the editor. The emitted image is chosen by role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ContainerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    /// In-container paths that survive redeploys through host bind mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persistence_paths: Vec<String>,
    /// Initial forwarding policy, honoured on router and firewall containers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub firewall_rules: Vec<FirewallRule>,
}

impl Container {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        container_type: ContainerType,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            container_type,
            ip: ip.into(),
            kind: None,
            image: None,
            status: None,
            metadata: None,
            persistence_paths: Vec::new(),
            firewall_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Subnet {
    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.id == id)
    }

    /// First router or firewall in containment order. This is the subnet's
    /// representative on inter-subnet links.
    pub fn first_gateway(&self) -> Option<&Container> {
        self.containers.iter().find(|c| c.container_type.is_gateway())
    }

    pub fn first_switch(&self) -> Option<&Container> {
        self.containers
            .iter()
            .find(|c| c.container_type == ContainerType::Switch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub subnet_connections: Vec<Connection>,
}

impl Site {
    pub fn subnet(&self, id: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.id == id)
    }

    /// First router or firewall found scanning subnets in order. This is the
    /// site's representative on inter-site links.
    pub fn first_gateway(&self) -> Option<&Container> {
        self.subnets.iter().find_map(|s| s.first_gateway())
    }

    /// True when `id` names a router or firewall in one of this site's subnets.
    pub fn owns_gateway(&self, id: &str) -> bool {
        self.subnets
            .iter()
            .filter_map(|s| s.container(id))
            .any(|c| c.container_type.is_gateway())
    }
}

/// Root of the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub site_connections: Vec<Connection>,
}

impl Topology {
    pub fn site(&self, id: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.id == id)
    }

    /// Locate a subnet and the site that owns it.
    pub fn subnet(&self, id: &str) -> Option<(&Site, &Subnet)> {
        self.sites
            .iter()
            .find_map(|site| site.subnet(id).map(|subnet| (site, subnet)))
    }

    /// Locate a container and the subnet that owns it.
    pub fn container(&self, id: &str) -> Option<(&Subnet, &Container)> {
        self.subnets()
            .find_map(|subnet| subnet.container(id).map(|c| (subnet, c)))
    }

    pub fn subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.sites.iter().flat_map(|site| site.subnets.iter())
    }

    /// Every container with its owning subnet, in containment order.
    pub fn containers(&self) -> impl Iterator<Item = (&Subnet, &Container)> {
        self.subnets()
            .flat_map(|subnet| subnet.containers.iter().map(move |c| (subnet, c)))
    }

    pub(crate) fn site_mut(&mut self, id: &str) -> Option<&mut Site> {
        self.sites.iter_mut().find(|s| s.id == id)
    }

    pub(crate) fn subnet_mut(&mut self, id: &str) -> Option<&mut Subnet> {
        self.sites
            .iter_mut()
            .flat_map(|site| site.subnets.iter_mut())
            .find(|s| s.id == id)
    }
}
