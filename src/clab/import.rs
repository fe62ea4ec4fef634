//! Containerlab file import.
//!
//! Reverses a containerlab descriptor into an editable topology. Only what
//! the descriptor actually states is recovered: container types come from
//! our own labels when present and are otherwise inferred from the image and
//! start-up commands, addresses come from the first `ip addr add|replace`
//! command, and subnets are rebuilt by grouping nodes on their derived CIDR.

use ipnet::Ipv4Net;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use super::types::{ClabConfig, ClabNode, ROLE_LABEL, TYPE_LABEL};
use crate::node::firewall::{parse_chain_rules, FirewallRule};
use crate::topology::{Connection, Container, ContainerType, IdGenerator, Position, Site, Subnet, Topology};

/// Site used for nodes without a `group`.
pub const DEFAULT_SITE: &str = "Imported Site";
/// Catch-all subnet for nodes whose address could not be recovered.
pub const FALLBACK_CIDR: &str = "10.0.0.0/24";

const SITE_GRID: [(f64, f64); 6] = [
    (100.0, 100.0),
    (450.0, 100.0),
    (800.0, 100.0),
    (100.0, 400.0),
    (450.0, 400.0),
    (800.0, 400.0),
];

/// Canvas position of the `index`-th imported site.
pub fn site_position(index: usize) -> Position {
    match SITE_GRID.get(index) {
        Some(&(x, y)) => Position { x, y },
        None => Position {
            x: 100.0 + index as f64 * 350.0,
            y: 100.0,
        },
    }
}

/// Parsed `ip addr` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeAddress {
    ip: Ipv4Addr,
    network: Ipv4Net,
}

/// First `ip addr add|replace A.B.C.D/P` in a node's start-up commands.
static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ip addr (?:add|replace) (\d+\.\d+\.\d+\.\d+)/(\d+)")
        .expect("Invalid address regex")
});

fn extract_address(exec: &[String]) -> Option<NodeAddress> {
    exec.iter().find_map(|cmd| {
        let caps = ADDRESS_PATTERN.captures(cmd)?;
        let ip: Ipv4Addr = caps[1].parse().ok()?;
        let prefix: u8 = caps[2].parse().ok()?;
        let network = Ipv4Net::new(ip, prefix).ok()?.trunc();
        Some(NodeAddress { ip, network })
    })
}

/// Firewall rules recovered from the `iptables -F`/`-A` commands of a node.
fn extract_firewall_rules(exec: &[String]) -> Vec<FirewallRule> {
    let Some(chain) = exec.iter().find_map(|cmd| cmd.strip_prefix("iptables -F ")) else {
        return Vec::new();
    };
    let listing = exec
        .iter()
        .filter_map(|cmd| cmd.strip_prefix("iptables "))
        .collect::<Vec<_>>()
        .join("\n");
    parse_chain_rules(chain.trim(), &listing)
}

/// Build a topology from `clab`, drawing fresh ids from `ids`.
///
/// Nodes are visited in name order so repeated imports with a
/// deterministic generator produce the same topology.
pub fn import(clab: &ClabConfig, ids: &mut dyn IdGenerator) -> Topology {
    let has_groups = clab.topology.nodes.values().any(|n| n.group.is_some());

    // site name -> cidr -> members; insertion order tracked separately
    let mut site_order: Vec<String> = Vec::new();
    let mut buckets: BTreeMap<String, Vec<(String, Vec<(String, Container)>)>> = BTreeMap::new();
    let mut unaddressed: Vec<(String, Container)> = Vec::new();

    for (node_name, node) in &clab.topology.nodes {
        let container_type = infer_type(node);
        let address = extract_address(&node.exec);
        let mut container = Container::new(
            ids.next_id(),
            node_name.clone(),
            container_type,
            address.map(|a| a.ip.to_string()).unwrap_or_default(),
        );
        if !is_stock_image(&node.image) && !node.image.is_empty() {
            container.image = Some(node.image.clone());
        }
        if container_type.is_gateway() {
            container.firewall_rules = extract_firewall_rules(&node.exec);
        }
        debug!("Imported node {} as {}", node_name, container_type);

        let Some(address) = address else {
            unaddressed.push((node_name.clone(), container));
            continue;
        };

        let site = match (&node.group, has_groups) {
            (Some(group), true) if !group.trim().is_empty() => group.trim().to_string(),
            _ => DEFAULT_SITE.to_string(),
        };
        let cidr = address.network.to_string();
        if !buckets.contains_key(&site) {
            site_order.push(site.clone());
        }
        let subnets = buckets.entry(site).or_default();
        match subnets.iter_mut().find(|(c, _)| *c == cidr) {
            Some((_, members)) => members.push((node_name.clone(), container)),
            None => subnets.push((cidr, vec![(node_name.clone(), container)])),
        }
    }

    if !unaddressed.is_empty() {
        warn!(
            "{} nodes have no recoverable address; placing them in {}",
            unaddressed.len(),
            FALLBACK_CIDR
        );
        if !buckets.contains_key(DEFAULT_SITE) {
            site_order.push(DEFAULT_SITE.to_string());
        }
        buckets
            .entry(DEFAULT_SITE.to_string())
            .or_default()
            .push((String::new(), unaddressed));
    }

    let link_pairs: Vec<(&str, &str)> = clab.topology.links.iter().filter_map(|l| l.nodes()).collect();

    let mut topology = Topology {
        name: Some(clab.name.clone()),
        ..Default::default()
    };

    for (index, site_name) in site_order.iter().enumerate() {
        let Some(cidr_buckets) = buckets.remove(site_name) else {
            continue;
        };
        let mut site = Site {
            id: ids.next_id(),
            name: site_name.clone(),
            location: site_name.clone(),
            position: site_position(index),
            subnets: Vec::new(),
            subnet_connections: Vec::new(),
        };

        for (cidr, members) in cidr_buckets {
            site.subnets.push(build_subnet(ids.next_id(), &cidr, members, &link_pairs));
        }
        topology.sites.push(site);
    }

    info!(
        "Imported {} nodes into {} sites, {} subnets",
        clab.topology.nodes.len(),
        topology.sites.len(),
        topology.subnets().count()
    );
    topology
}

fn build_subnet(
    id: String,
    cidr: &str,
    members: Vec<(String, Container)>,
    link_pairs: &[(&str, &str)],
) -> Subnet {
    let catch_all = cidr.is_empty();
    let gateway = if catch_all {
        None
    } else {
        members
            .iter()
            .find(|(_, c)| c.container_type == ContainerType::Router && !c.ip.is_empty())
            .or_else(|| members.first())
            .map(|(_, c)| c.ip.clone())
            .filter(|ip| !ip.is_empty())
    };

    let by_name: BTreeMap<&str, &str> = members
        .iter()
        .map(|(name, c)| (name.as_str(), c.id.as_str()))
        .collect();
    let connections: Vec<Connection> = link_pairs
        .iter()
        .filter_map(|(a, b)| Some(Connection::new(*by_name.get(a)?, *by_name.get(b)?)))
        .collect();

    let cidr = if catch_all { FALLBACK_CIDR } else { cidr };
    Subnet {
        id,
        name: format!("Subnet {}", cidr),
        cidr: cidr.to_string(),
        gateway,
        connections,
        containers: members.into_iter().map(|(_, c)| c).collect(),
    }
}

fn is_stock_image(image: &str) -> bool {
    matches!(image, "alpine:latest" | "frrouting/frr:latest")
}

/// Labels written by the emitter first, then image and command heuristics.
pub fn infer_type(node: &ClabNode) -> ContainerType {
    if let Some(ty) = node.labels.get(TYPE_LABEL).and_then(|t| parse_type(t)) {
        return ty;
    }
    match node.labels.get(ROLE_LABEL).map(String::as_str) {
        Some("router") => return ContainerType::Router,
        Some("switch") => return ContainerType::Switch,
        Some("host") => return ContainerType::Workstation,
        _ => {}
    }

    let joined = node.exec.join(" ");
    if node.image.contains("frr") && joined.contains("ip_forward") {
        ContainerType::Router
    } else if joined.contains("type bridge") {
        ContainerType::Switch
    } else {
        ContainerType::Workstation
    }
}

fn parse_type(value: &str) -> Option<ContainerType> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).ok()
}
