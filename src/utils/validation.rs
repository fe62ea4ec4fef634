//! Topology validation utilities.
//!
//! This module provides the checks run on a topology before it reaches the
//! address planner: identifier uniqueness, subnet and container addressing,
//! and connection consistency at every containment level.

use log::{debug, warn};
use std::collections::HashSet;

use crate::config::ValidationError;
use crate::ip::cidr::{is_usable_host, parse_cidr, parse_ip, usable_hosts};
use crate::topology::{Connection, Topology};

fn invalid(message: String) -> ValidationError {
    ValidationError::InvalidTopology(message)
}

/// Validate a topology before planning
///
/// Checks for:
/// - Globally unique site, subnet and container ids
/// - Parseable subnet CIDRs with at least one usable host
/// - Container addresses that are usable hosts of their subnet and unique within it
/// - Subnet gateways inside their subnet
/// - Connections whose endpoints exist, with no self-links and no duplicate edges
///
/// # Arguments
/// * `topology` - The topology to validate
///
/// # Returns
/// * `Ok(())` if validation succeeds
/// * `Err(ValidationError::InvalidTopology)` describing the first problem found
///
/// # Examples
/// ```
/// use netlab::topology::Topology;
/// use netlab::utils::validation::validate_topology;
///
/// assert!(validate_topology(&Topology::default()).is_ok());
/// ```
pub fn validate_topology(topology: &Topology) -> Result<(), ValidationError> {
    validate_unique_ids(topology)?;
    validate_addressing(topology)?;
    validate_connections(topology)?;
    warn_overlapping_subnets(topology);
    debug!(
        "Topology validated: {} sites, {} subnets, {} containers",
        topology.sites.len(),
        topology.subnets().count(),
        topology.containers().count()
    );
    Ok(())
}

/// Validate that every id appears once across sites, subnets and containers
pub fn validate_unique_ids(topology: &Topology) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    let ids = topology
        .sites
        .iter()
        .map(|s| s.id.as_str())
        .chain(topology.subnets().map(|s| s.id.as_str()))
        .chain(topology.containers().map(|(_, c)| c.id.as_str()));

    for id in ids {
        if id.trim().is_empty() {
            return Err(invalid("empty id in topology".to_string()));
        }
        if !seen.insert(id) {
            return Err(invalid(format!("Duplicate id '{}' in topology", id)));
        }
    }
    Ok(())
}

/// Validate subnet CIDRs, gateways and container addresses
pub fn validate_addressing(topology: &Topology) -> Result<(), ValidationError> {
    for subnet in topology.subnets() {
        let cidr = parse_cidr(&subnet.cidr)
            .map_err(|e| invalid(format!("Subnet '{}': {}", subnet.name, e)))?;
        if usable_hosts(&cidr).next().is_none() {
            return Err(invalid(format!(
                "Subnet '{}' ({}) has no usable host addresses",
                subnet.name, cidr
            )));
        }

        if let Some(gateway) = subnet.gateway.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            let ip = parse_ip(gateway)
                .map_err(|e| invalid(format!("Gateway of subnet '{}': {}", subnet.name, e)))?;
            if !is_usable_host(&cidr, ip) {
                return Err(invalid(format!(
                    "Gateway {} of subnet '{}' is not a usable host of {}",
                    ip, subnet.name, cidr
                )));
            }
            if !subnet.containers.iter().any(|c| c.ip == gateway) {
                warn!(
                    "Gateway {} of subnet '{}' does not belong to any container",
                    gateway, subnet.name
                );
            }
        }

        let mut assigned_ips = HashSet::new();
        for container in &subnet.containers {
            let ip = parse_ip(&container.ip).map_err(|e| {
                invalid(format!("Container '{}' ({}): {}", container.name, container.id, e))
            })?;
            if !is_usable_host(&cidr, ip) {
                return Err(invalid(format!(
                    "Container '{}' address {} is not a usable host of {}",
                    container.name, ip, cidr
                )));
            }
            if !assigned_ips.insert(ip) {
                return Err(invalid(format!(
                    "Duplicate IP address {} in subnet '{}'",
                    ip, subnet.name
                )));
            }
        }
    }
    Ok(())
}

fn check_edges<'a>(
    level: &str,
    connections: &'a [Connection],
    exists: impl Fn(&str) -> bool,
) -> Result<(), ValidationError> {
    let mut edges: HashSet<(&'a str, &'a str)> = HashSet::new();
    for conn in connections {
        for endpoint in [&conn.from, &conn.to] {
            if !exists(endpoint.as_str()) {
                return Err(invalid(format!(
                    "{} connection {} -> {} references unknown endpoint '{}'",
                    level, conn.from, conn.to, endpoint
                )));
            }
        }
        if conn.from == conn.to {
            return Err(invalid(format!(
                "{} connection links '{}' to itself",
                level, conn.from
            )));
        }
        let key = if conn.from <= conn.to {
            (conn.from.as_str(), conn.to.as_str())
        } else {
            (conn.to.as_str(), conn.from.as_str())
        };
        if !edges.insert(key) {
            return Err(invalid(format!(
                "Duplicate {} connection between '{}' and '{}'",
                level, key.0, key.1
            )));
        }
        if conn.from_interface.as_deref() == Some("eth0") || conn.to_interface.as_deref() == Some("eth0") {
            warn!(
                "{} connection {} -> {} pins eth0, which the runner uses for management",
                level, conn.from, conn.to
            );
        }
    }
    Ok(())
}

/// Validate connection endpoints at every containment level
pub fn validate_connections(topology: &Topology) -> Result<(), ValidationError> {
    for site in &topology.sites {
        for subnet in &site.subnets {
            check_edges("Subnet", &subnet.connections, |id| subnet.container(id).is_some())?;
        }
        // A router or firewall id is accepted where a subnet is expected.
        check_edges("Inter-subnet", &site.subnet_connections, |id| {
            site.subnet(id).is_some() || site.owns_gateway(id)
        })?;
    }
    check_edges("Inter-site", &topology.site_connections, |id| {
        topology.site(id).is_some() || topology.sites.iter().any(|site| site.owns_gateway(id))
    })?;
    Ok(())
}

/// Log subnets whose CIDRs overlap; routing between them is ambiguous
fn warn_overlapping_subnets(topology: &Topology) {
    let nets: Vec<_> = topology
        .subnets()
        .filter_map(|s| parse_cidr(&s.cidr).ok().map(|net| (s, net)))
        .collect();
    for (i, (a, net_a)) in nets.iter().enumerate() {
        for (b, net_b) in &nets[i + 1..] {
            if net_a.contains(net_b) || net_b.contains(net_a) {
                warn!(
                    "Subnets '{}' ({}) and '{}' ({}) overlap",
                    a.name, net_a, b.name, net_b
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Container, ContainerType, Site, Subnet};

    fn sample() -> Topology {
        let subnet = Subnet {
            id: "net1".to_string(),
            name: "Control".to_string(),
            cidr: "10.0.1.0/24".to_string(),
            gateway: Some("10.0.1.1".to_string()),
            containers: vec![
                Container::new("r1", "Router", ContainerType::Router, "10.0.1.1"),
                Container::new("s1", "Switch", ContainerType::Switch, "10.0.1.2"),
            ],
            connections: vec![Connection::new("s1", "r1")],
        };
        Topology {
            name: Some("plant".to_string()),
            sites: vec![Site {
                id: "hq".to_string(),
                name: "HQ".to_string(),
                location: String::new(),
                position: Default::default(),
                subnets: vec![subnet],
                subnet_connections: Vec::new(),
            }],
            site_connections: Vec::new(),
        }
    }

    fn error_message(topology: &Topology) -> String {
        validate_topology(topology).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_topology() {
        assert!(validate_topology(&sample()).is_ok());
    }

    #[test]
    fn test_duplicate_ids() {
        let mut topology = sample();
        topology.sites[0].subnets[0].containers[1].id = "r1".to_string();
        assert!(error_message(&topology).contains("Duplicate id 'r1'"));
    }

    #[test]
    fn test_malformed_cidr_and_ip() {
        let mut topology = sample();
        topology.sites[0].subnets[0].cidr = "10.0.1.0/33".to_string();
        assert!(validate_topology(&topology).is_err());

        let mut topology = sample();
        topology.sites[0].subnets[0].containers[1].ip = "10.0.1".to_string();
        assert!(error_message(&topology).contains("Container 'Switch'"));
    }

    #[test]
    fn test_ip_outside_subnet_and_broadcast() {
        let mut topology = sample();
        topology.sites[0].subnets[0].containers[1].ip = "10.0.2.5".to_string();
        assert!(error_message(&topology).contains("not a usable host"));

        let mut topology = sample();
        topology.sites[0].subnets[0].containers[1].ip = "10.0.1.255".to_string();
        assert!(error_message(&topology).contains("not a usable host"));
    }

    #[test]
    fn test_duplicate_ip_in_subnet() {
        let mut topology = sample();
        topology.sites[0].subnets[0].containers[1].ip = "10.0.1.1".to_string();
        assert!(error_message(&topology).contains("Duplicate IP address 10.0.1.1"));
    }

    #[test]
    fn test_gateway_outside_subnet() {
        let mut topology = sample();
        topology.sites[0].subnets[0].gateway = Some("192.168.0.1".to_string());
        assert!(error_message(&topology).contains("Gateway 192.168.0.1"));
    }

    #[test]
    fn test_dangling_and_duplicate_connections() {
        let mut topology = sample();
        topology.sites[0].subnets[0].connections.push(Connection::new("s1", "ghost"));
        assert!(error_message(&topology).contains("unknown endpoint 'ghost'"));

        let mut topology = sample();
        topology.sites[0].subnets[0].connections.push(Connection::new("r1", "s1"));
        assert!(error_message(&topology).contains("Duplicate Subnet connection"));

        let mut topology = sample();
        topology.site_connections.push(Connection::new("hq", "hq"));
        assert!(error_message(&topology).contains("to itself"));
    }

    #[test]
    fn test_cross_level_endpoints_must_route() {
        let mut topology = sample();
        topology.sites[0].subnet_connections.push(Connection::new("s1", "net1"));
        assert!(error_message(&topology).contains("unknown endpoint 's1'"));

        let mut topology = sample();
        topology.site_connections.push(Connection::new("s1", "hq"));
        assert!(error_message(&topology).contains("unknown endpoint 's1'"));

        let mut topology = sample();
        topology.sites[0].subnet_connections.push(Connection::new("r1", "net1"));
        assert!(validate_topology(&topology).is_ok());
    }
}
