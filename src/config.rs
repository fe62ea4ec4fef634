//! Compiler configuration.
//!
//! Every field is optional in the YAML file; missing fields fall back to the
//! defaults below, which reproduce the stock containerlab layout (FRR for
//! gateways, Alpine for everything else, `eth0` left to the runner).

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::ip::allocator::LINK_PREFIX_LEN;
use crate::plan::PlannerOptions;

/// Container images chosen per node role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub router: String,
    pub switch: String,
    pub host: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            router: "frrouting/frr:latest".to_string(),
            switch: "alpine:latest".to_string(),
            host: "alpine:latest".to_string(),
        }
    }
}

/// Management network naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// Network name is `{network_prefix}-{id prefix}`.
    pub network_prefix: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            network_prefix: "ae3gis-mgmt".to_string(),
        }
    }
}

/// Top-level compiler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Used when the topology carries no name (or only whitespace).
    pub default_topology_name: String,
    /// Hex characters of the topology id used in deployment and network names.
    pub id_prefix_len: usize,
    pub images: ImageConfig,
    /// Containerlab node kind.
    pub node_kind: String,
    /// Reserved block for cross-subnet `/30` links.
    pub point_to_point_block: Ipv4Net,
    /// First auto-numbered data interface. `eth0` belongs to the runner.
    pub first_interface_index: u32,
    pub bridge_name: String,
    pub management: ManagementConfig,
    /// Host directory holding bind-mounted persistence paths.
    pub persistence_root: String,
    pub firewall_chain: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_topology_name: "ae3gis-topology".to_string(),
            id_prefix_len: 8,
            images: ImageConfig::default(),
            node_kind: "linux".to_string(),
            point_to_point_block: PlannerOptions::default().link_block,
            first_interface_index: 1,
            bridge_name: "br0".to_string(),
            management: ManagementConfig::default(),
            persistence_root: "clab-workdir/persistent".to_string(),
            firewall_chain: "AE3GIS-FW".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_topology_name.trim().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "default_topology_name cannot be empty".to_string(),
            ));
        }
        if self.id_prefix_len == 0 || self.id_prefix_len > 32 {
            return Err(ValidationError::InvalidGeneral(format!(
                "id_prefix_len must be between 1 and 32, got {}",
                self.id_prefix_len
            )));
        }
        if self.node_kind.trim().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "node_kind cannot be empty".to_string(),
            ));
        }

        for (role, image) in [
            ("router", &self.images.router),
            ("switch", &self.images.switch),
            ("host", &self.images.host),
        ] {
            if image.trim().is_empty() {
                return Err(ValidationError::InvalidImages(format!(
                    "image for {} nodes cannot be empty",
                    role
                )));
            }
        }

        if self.point_to_point_block.prefix_len() > LINK_PREFIX_LEN {
            return Err(ValidationError::InvalidNetwork(format!(
                "point_to_point_block {} cannot hold a single /{} link",
                self.point_to_point_block, LINK_PREFIX_LEN
            )));
        }
        if self.bridge_name.trim().is_empty() || self.bridge_name.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidNetwork(format!(
                "bridge_name '{}' is not a valid interface name",
                self.bridge_name
            )));
        }
        if self.management.network_prefix.trim().is_empty() {
            return Err(ValidationError::InvalidNetwork(
                "management.network_prefix cannot be empty".to_string(),
            ));
        }
        if self.firewall_chain.trim().is_empty() || self.firewall_chain.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidNetwork(format!(
                "firewall_chain '{}' is not a valid iptables chain name",
                self.firewall_chain
            )));
        }

        Ok(())
    }

    pub fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            link_block: self.point_to_point_block.trunc(),
            first_interface_index: self.first_interface_index,
        }
    }

    /// Topology name, falling back to the configured default.
    pub fn topology_name<'a>(&'a self, name: Option<&'a str>) -> &'a str {
        name.map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.default_topology_name)
    }
}

/// Configuration and topology validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid image configuration: {0}")]
    InvalidImages(String),
    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),
}
