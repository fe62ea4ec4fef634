//! Containerlab descriptor emission.
//!
//! Assembles the planner's links and the synthesized node configurations
//! into a [`ClabConfig`]. Nodes are keyed by container id in a sorted map,
//! and links keep planning order, so equal inputs serialize byte-for-byte
//! identically.

use log::{debug, info};
use std::collections::{BTreeMap, HashMap};

use super::naming::{
    deployment_name, management_ipv4_subnet, management_ipv6_subnet, management_network_name,
    NamingError,
};
use super::types::{ClabConfig, ClabLink, ClabMgmt, ClabNode, ClabTopology, DEGRADED_LABEL, ROLE_LABEL, TYPE_LABEL};
use crate::config::CompilerConfig;
use crate::node::NodeConfig;
use crate::plan::AddressPlan;
use crate::topology::Topology;

/// Identity of one deployment of a topology.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentTarget<'a> {
    /// Stable topology record id (hex, at least `id_prefix_len` characters).
    pub topology_id: &'a str,
    /// Management subnet retry attempt, `0` on first deploy.
    pub attempt: u32,
}

/// Management section for `target`.
pub fn management(target: DeploymentTarget<'_>, config: &CompilerConfig) -> Result<ClabMgmt, NamingError> {
    Ok(ClabMgmt {
        network: management_network_name(
            &config.management.network_prefix,
            target.topology_id,
            config.id_prefix_len,
        )?,
        ipv4_subnet: management_ipv4_subnet(target.topology_id, target.attempt)?.to_string(),
        ipv6_subnet: Some(management_ipv6_subnet(target.topology_id, target.attempt)?.to_string()),
    })
}

/// Build the containerlab descriptor.
///
/// `nodes` must hold one entry per planned container; containers without a
/// node configuration are skipped.
pub fn build_descriptor(
    topology: &Topology,
    plan: &AddressPlan,
    nodes: &[NodeConfig],
    target: DeploymentTarget<'_>,
    config: &CompilerConfig,
) -> Result<ClabConfig, NamingError> {
    let name = deployment_name(
        config.topology_name(topology.name.as_deref()),
        target.topology_id,
        config.id_prefix_len,
    )?;
    let mgmt = management(target, config)?;

    let by_id: HashMap<&str, &NodeConfig> = nodes.iter().map(|n| (n.container_id.as_str(), n)).collect();
    let mut clab_nodes = BTreeMap::new();

    for site in &topology.sites {
        for subnet in &site.subnets {
            for container in &subnet.containers {
                let Some(node) = by_id.get(container.id.as_str()) else {
                    continue;
                };

                let mut labels = BTreeMap::new();
                labels.insert(ROLE_LABEL.to_string(), node.role.as_str().to_string());
                labels.insert(TYPE_LABEL.to_string(), container.container_type.to_string());
                if node.is_degraded() {
                    let reasons: Vec<&str> = node.degraded.iter().map(|d| d.as_label()).collect();
                    labels.insert(DEGRADED_LABEL.to_string(), reasons.join(","));
                }

                clab_nodes.insert(
                    container.id.clone(),
                    ClabNode {
                        kind: container.kind.clone().unwrap_or_else(|| config.node_kind.clone()),
                        image: node.image.clone(),
                        group: Some(site.name.clone()),
                        labels,
                        binds: node.binds.clone(),
                        exec: node.exec.clone(),
                    },
                );
            }
        }
    }

    let links: Vec<ClabLink> = plan
        .links
        .iter()
        .map(|link| {
            ClabLink::new(
                (link.a.container.as_str(), link.a.interface.as_str()),
                (link.b.container.as_str(), link.b.interface.as_str()),
            )
        })
        .collect();

    debug!("Management network {} ({})", mgmt.network, mgmt.ipv4_subnet);
    info!(
        "Built descriptor '{}' with {} nodes and {} links",
        name,
        clab_nodes.len(),
        links.len()
    );

    Ok(ClabConfig {
        name,
        mgmt: Some(mgmt),
        topology: ClabTopology {
            nodes: clab_nodes,
            links,
        },
    })
}

/// Serialize a descriptor to containerlab YAML.
pub fn to_yaml(config: &ClabConfig) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{synthesize, Degraded, Role};
    use crate::plan::{plan, PlannerOptions};
    use crate::topology::{Container, ContainerType, Edit, SequentialIds};

    const TOPOLOGY_ID: &str = "deadbeef00112233445566778899aabb";

    fn lab() -> Topology {
        let mut topology = Topology {
            name: Some("plant".to_string()),
            ..Default::default()
        };
        let mut ids = SequentialIds::new("id");
        let site = topology
            .apply(
                Edit::AddSite {
                    name: "HQ".to_string(),
                    location: String::new(),
                    position: Default::default(),
                },
                &mut ids,
            )
            .unwrap()
            .created()[0]
            .clone();
        topology
            .apply(
                Edit::AddSubnet {
                    site_id: site,
                    name: "Control".to_string(),
                    cidr: "10.0.1.0/24".to_string(),
                },
                &mut ids,
            )
            .unwrap();
        topology
    }

    fn descriptor(topology: &Topology) -> ClabConfig {
        let config = CompilerConfig::default();
        let plan = plan(topology, &PlannerOptions::default()).unwrap();
        let nodes: Vec<NodeConfig> = topology
            .containers()
            .map(|(_, c)| synthesize(c, plan.container(&c.id).unwrap(), TOPOLOGY_ID, &config))
            .collect();
        let target = DeploymentTarget {
            topology_id: TOPOLOGY_ID,
            attempt: 0,
        };
        build_descriptor(topology, &plan, &nodes, target, &config).unwrap()
    }

    #[test]
    fn test_descriptor_names_and_mgmt() {
        let clab = descriptor(&lab());
        assert_eq!(clab.name, "plant-deadbeef");
        let mgmt = clab.mgmt.unwrap();
        assert_eq!(mgmt.network, "ae3gis-mgmt-deadbeef");
        assert!(mgmt.ipv4_subnet.starts_with("100."));
        assert!(mgmt.ipv4_subnet.ends_with(".0/24"));
    }

    #[test]
    fn test_descriptor_nodes_and_links() {
        let topology = lab();
        let clab = descriptor(&topology);
        assert_eq!(clab.topology.nodes.len(), 2);
        assert_eq!(clab.topology.links.len(), 1);

        let (_, router) = topology
            .containers()
            .find(|(_, c)| c.container_type == ContainerType::Router)
            .unwrap();
        let node = &clab.topology.nodes[&router.id];
        assert_eq!(node.kind, "linux");
        assert_eq!(node.image, "frrouting/frr:latest");
        assert_eq!(node.group.as_deref(), Some("HQ"));
        assert_eq!(node.labels[ROLE_LABEL], Role::Router.as_str());
        assert!(node.exec.contains(&"sysctl -w net.ipv4.ip_forward=1".to_string()));
    }

    #[test]
    fn test_container_kind_overrides_default() {
        let mut topology = lab();
        topology.sites[0].subnets[0].containers[0].kind = Some("linux-vm".to_string());
        let router_id = topology.sites[0].subnets[0].containers[0].id.clone();
        let switch_id = topology.sites[0].subnets[0].containers[1].id.clone();

        let clab = descriptor(&topology);
        assert_eq!(clab.topology.nodes[&router_id].kind, "linux-vm");
        assert_eq!(clab.topology.nodes[&switch_id].kind, "linux");
    }

    #[test]
    fn test_degraded_switch_is_labelled() {
        // The provisioned switch has only its uplink, so no bridge is built.
        let clab = descriptor(&lab());
        let switch = clab
            .topology
            .nodes
            .values()
            .find(|n| n.labels.get(ROLE_LABEL).map(String::as_str) == Some("switch"))
            .unwrap();
        assert_eq!(
            switch.labels.get(DEGRADED_LABEL).map(String::as_str),
            Some(Degraded::NoBridge { ports: 1 }.as_label())
        );
    }

    #[test]
    fn test_yaml_is_deterministic() {
        let topology = lab();
        let first = to_yaml(&descriptor(&topology)).unwrap();
        let second = to_yaml(&descriptor(&topology)).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("ipv4-subnet"));
        assert!(first.contains("endpoints"));
    }

    #[test]
    fn test_bad_topology_id() {
        let topology = lab();
        let config = CompilerConfig::default();
        let plan = plan(&topology, &PlannerOptions::default()).unwrap();
        let target = DeploymentTarget {
            topology_id: "nothex!!",
            attempt: 0,
        };
        assert!(build_descriptor(&topology, &plan, &[], target, &config).is_err());
    }

    #[test]
    fn test_unplanned_container_skipped() {
        let mut topology = lab();
        topology.sites[0].subnets[0]
            .containers
            .push(Container::new("ghost", "Ghost", ContainerType::Workstation, "10.0.1.50"));
        let config = CompilerConfig::default();
        let plan = plan(&topology, &PlannerOptions::default()).unwrap();
        let target = DeploymentTarget {
            topology_id: TOPOLOGY_ID,
            attempt: 0,
        };
        let clab = build_descriptor(&topology, &plan, &[], target, &config).unwrap();
        assert!(clab.topology.nodes.is_empty());
    }
}
