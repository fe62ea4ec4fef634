//! Containerlab descriptor types.
//!
//! This module contains the structures serialized to (and, for import,
//! read back from) a containerlab topology file: the deployment name,
//! the management network, the node map and the link list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node label carrying the functional role (`router`, `switch`, `host`).
pub const ROLE_LABEL: &str = "ae3gis.role";
/// Node label carrying the original container type.
pub const TYPE_LABEL: &str = "ae3gis.type";
/// Node label listing degraded-mode reasons, comma separated.
pub const DEGRADED_LABEL: &str = "ae3gis.degraded";

/// Root containerlab document.
///
/// This is the structure that gets serialized to YAML and consumed by
/// `containerlab deploy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClabConfig {
    /// Deployment name; containerlab prefixes runtime container names with it
    pub name: String,
    /// Management network (omitted by hand-written files)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt: Option<ClabMgmt>,
    pub topology: ClabTopology,
}

/// Management network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClabMgmt {
    /// Docker network name
    pub network: String,
    #[serde(rename = "ipv4-subnet")]
    pub ipv4_subnet: String,
    #[serde(rename = "ipv6-subnet", default, skip_serializing_if = "Option::is_none")]
    pub ipv6_subnet: Option<String>,
}

/// Nodes keyed by container id, plus the link list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClabTopology {
    #[serde(default)]
    pub nodes: BTreeMap<String, ClabNode>,
    #[serde(default)]
    pub links: Vec<ClabLink>,
}

/// One containerlab node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClabNode {
    /// Node kind (e.g., "linux")
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub image: String,
    /// Free-form grouping; the importer maps it onto sites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// `host:container` bind mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    /// Commands run inside the node after start-up, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<String>,
}

/// A point-to-point wire between two `node:interface` endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClabLink {
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl ClabLink {
    pub fn new(a: (&str, &str), b: (&str, &str)) -> Self {
        Self {
            endpoints: vec![format!("{}:{}", a.0, a.1), format!("{}:{}", b.0, b.1)],
        }
    }

    /// Node names of a two-endpoint link.
    pub fn nodes(&self) -> Option<(&str, &str)> {
        match self.endpoints.as_slice() {
            [a, b] => Some((endpoint_node(a), endpoint_node(b))),
            _ => None,
        }
    }
}

fn endpoint_node(endpoint: &str) -> &str {
    endpoint.split(':').next().unwrap_or(endpoint)
}
