//! Node configuration synthesis.
//!
//! Turns one container's slice of the address plan into the image and the
//! ordered start-up commands its node runs. Commands are plain `ip`,
//! `sysctl` and `iptables` invocations so that any Linux image with
//! iproute2 can execute them.

use log::{debug, warn};
use serde::Serialize;
use std::path::{Component, Path};

use super::firewall::rule_commands;
use super::role::Role;
use crate::config::CompilerConfig;
use crate::plan::{ContainerPlan, InterfaceRole};
use crate::topology::Container;

/// Reasons a node was configured in a reduced form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Degraded {
    /// Switch with fewer than two ports; no bridge was created.
    NoBridge { ports: usize },
    /// The primary address has no interface to live on.
    UnboundAddress,
}

impl Degraded {
    pub fn as_label(&self) -> &'static str {
        match self {
            Degraded::NoBridge { .. } => "no-bridge",
            Degraded::UnboundAddress => "unbound-address",
        }
    }
}

/// Everything emitted for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeConfig {
    pub container_id: String,
    pub role: Role,
    pub image: String,
    pub exec: Vec<String>,
    /// `host:container` bind mounts for persistence paths.
    pub binds: Vec<String>,
    pub degraded: Vec<Degraded>,
}

impl NodeConfig {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

pub fn image_for(role: Role, config: &CompilerConfig) -> &str {
    match role {
        Role::Router => &config.images.router,
        Role::Switch => &config.images.switch,
        Role::Host => &config.images.host,
    }
}

/// Build the node configuration for `container` from its plan.
pub fn synthesize(
    container: &Container,
    plan: &ContainerPlan,
    topology_id: &str,
    config: &CompilerConfig,
) -> NodeConfig {
    let role = Role::of(container.container_type);
    let mut exec = Vec::new();
    let mut degraded = Vec::new();

    match role {
        Role::Switch => switch_commands(plan, config, &mut exec, &mut degraded),
        Role::Router => {
            address_commands(plan, &mut exec, &mut degraded);
            exec.push("sysctl -w net.ipv4.ip_forward=1".to_string());
            for route in &plan.routes {
                exec.push(format!("ip route replace {} via {}", route.destination, route.via));
            }
            if !container.firewall_rules.is_empty() {
                exec.extend(rule_commands(&config.firewall_chain, &container.firewall_rules));
            }
        }
        Role::Host => {
            address_commands(plan, &mut exec, &mut degraded);
            for route in &plan.routes {
                if route.is_default() {
                    exec.push(format!("ip route replace default via {}", route.via));
                } else {
                    exec.push(format!("ip route replace {} via {}", route.destination, route.via));
                }
            }
        }
    }

    if !container.firewall_rules.is_empty() && role != Role::Router {
        warn!(
            "Ignoring {} firewall rules on {} ({}): only routers and firewalls enforce them",
            container.firewall_rules.len(),
            container.name,
            container.container_type
        );
    }

    for reason in &degraded {
        warn!(
            "Node {} ({}) is degraded: {}",
            container.name,
            container.id,
            reason.as_label()
        );
    }

    let binds = persistence_binds(container, topology_id, config);
    debug!(
        "Node {}: role {}, {} commands, {} binds",
        container.id,
        role.as_str(),
        exec.len(),
        binds.len()
    );

    NodeConfig {
        container_id: container.id.clone(),
        role,
        image: image_for(role, config).to_string(),
        exec,
        binds,
        degraded,
    }
}

/// `ip addr add` for every addressed interface, home first.
fn address_commands(plan: &ContainerPlan, exec: &mut Vec<String>, degraded: &mut Vec<Degraded>) {
    if plan.home_interface().is_none() {
        degraded.push(Degraded::UnboundAddress);
    }
    let (home, others): (Vec<_>, Vec<_>) = plan
        .interfaces
        .iter()
        .partition(|i| i.role == InterfaceRole::Home);
    for interface in home.into_iter().chain(others) {
        if let Some(address) = interface.address {
            exec.push(format!("ip addr add {} dev {}", address, interface.name));
        }
    }
}

fn switch_commands(
    plan: &ContainerPlan,
    config: &CompilerConfig,
    exec: &mut Vec<String>,
    degraded: &mut Vec<Degraded>,
) {
    let ports: Vec<&str> = plan
        .interfaces
        .iter()
        .filter(|i| i.role == InterfaceRole::Member)
        .map(|i| i.name.as_str())
        .collect();
    let bridge = &config.bridge_name;

    match ports.as_slice() {
        [] => {
            degraded.push(Degraded::NoBridge { ports: 0 });
            degraded.push(Degraded::UnboundAddress);
        }
        [port] => {
            degraded.push(Degraded::NoBridge { ports: 1 });
            exec.push(format!("ip addr add {} dev {}", plan.primary_address(), port));
        }
        _ => {
            exec.push(format!("ip link add {} type bridge", bridge));
            for port in &ports {
                exec.push(format!("ip link set {} master {}", port, bridge));
            }
            exec.push(format!("ip link set {} up", bridge));
            exec.push(format!("ip addr add {} dev {}", plan.primary_address(), bridge));
        }
    }
}

/// Absolute, `..`-free form of a persistence path, or `None` when nothing remains.
pub fn normalize_persistence_path(raw: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(raw.trim()).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("/{}", parts.join("/")))
    }
}

/// Host directory name for a normalized container path.
fn persistence_slug(path: &str) -> String {
    path.trim_start_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// `host:container` binds under `{root}/{topology}/{container}/{slug}`.
pub fn persistence_binds(container: &Container, topology_id: &str, config: &CompilerConfig) -> Vec<String> {
    let mut binds: Vec<String> = Vec::new();
    for raw in &container.persistence_paths {
        let Some(path) = normalize_persistence_path(raw) else {
            warn!("Skipping empty persistence path '{}' on {}", raw, container.id);
            continue;
        };
        let host = Path::new(&config.persistence_root)
            .join(topology_id)
            .join(&container.id)
            .join(persistence_slug(&path));
        let bind = format!("{}:{}", host.display(), path);
        if !binds.contains(&bind) {
            binds.push(bind);
        }
    }
    binds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::firewall::{Action, FirewallRule, Protocol};
    use crate::plan::{PlannedInterface, StaticRoute};
    use crate::topology::ContainerType;

    fn iface(name: &str, role: InterfaceRole, address: Option<&str>) -> PlannedInterface {
        PlannedInterface {
            name: name.to_string(),
            role,
            address: address.map(|a| a.parse().unwrap()),
        }
    }

    fn container_plan(id: &str, ty: ContainerType, ip: &str, interfaces: Vec<PlannedInterface>) -> ContainerPlan {
        ContainerPlan {
            container_id: id.to_string(),
            name: id.to_string(),
            container_type: ty,
            subnet_id: "net1".to_string(),
            home_cidr: "10.0.1.0/24".parse().unwrap(),
            primary_ip: ip.parse().unwrap(),
            gateway: Some("10.0.1.1".parse().unwrap()),
            interfaces,
            routes: Vec::new(),
        }
    }

    #[test]
    fn test_switch_bridges_all_ports() {
        let container = Container::new("s1", "Switch", ContainerType::Switch, "10.0.1.2");
        let plan = container_plan(
            "s1",
            ContainerType::Switch,
            "10.0.1.2",
            vec![
                iface("eth1", InterfaceRole::Member, None),
                iface("eth2", InterfaceRole::Member, None),
            ],
        );
        let node = synthesize(&container, &plan, "abcd1234", &CompilerConfig::default());

        assert_eq!(
            node.exec,
            vec![
                "ip link add br0 type bridge",
                "ip link set eth1 master br0",
                "ip link set eth2 master br0",
                "ip link set br0 up",
                "ip addr add 10.0.1.2/24 dev br0",
            ]
        );
        assert_eq!(node.image, "alpine:latest");
        assert!(!node.is_degraded());
    }

    #[test]
    fn test_single_port_switch_is_degraded() {
        let container = Container::new("s1", "Switch", ContainerType::Switch, "10.0.1.2");
        let plan = container_plan(
            "s1",
            ContainerType::Switch,
            "10.0.1.2",
            vec![iface("eth1", InterfaceRole::Member, None)],
        );
        let node = synthesize(&container, &plan, "abcd1234", &CompilerConfig::default());

        assert_eq!(node.exec, vec!["ip addr add 10.0.1.2/24 dev eth1"]);
        assert_eq!(node.degraded, vec![Degraded::NoBridge { ports: 1 }]);
    }

    #[test]
    fn test_router_commands_in_order() {
        let mut container = Container::new("r1", "Router", ContainerType::Firewall, "10.0.1.1");
        container.firewall_rules.push(FirewallRule {
            protocol: Protocol::Tcp,
            port: "22".to_string(),
            action: Action::Drop,
            ..Default::default()
        });
        let mut plan = container_plan(
            "r1",
            ContainerType::Firewall,
            "10.0.1.1",
            vec![
                iface(
                    "eth1",
                    InterfaceRole::PointToPoint {
                        peer: "r2".to_string(),
                        peer_address: "10.255.0.2".parse().unwrap(),
                        peer_subnet: "10.0.2.0/24".parse().unwrap(),
                    },
                    Some("10.255.0.1/30"),
                ),
                iface("eth2", InterfaceRole::Home, Some("10.0.1.1/24")),
            ],
        );
        plan.routes.push(StaticRoute {
            destination: "10.0.2.0/24".parse().unwrap(),
            via: "10.255.0.2".parse().unwrap(),
        });
        let node = synthesize(&container, &plan, "abcd1234", &CompilerConfig::default());

        assert_eq!(node.image, "frrouting/frr:latest");
        assert_eq!(node.exec[0], "ip addr add 10.0.1.1/24 dev eth2");
        assert_eq!(node.exec[1], "ip addr add 10.255.0.1/30 dev eth1");
        assert_eq!(node.exec[2], "sysctl -w net.ipv4.ip_forward=1");
        assert_eq!(node.exec[3], "ip route replace 10.0.2.0/24 via 10.255.0.2");
        assert_eq!(
            node.exec.last().unwrap(),
            "iptables -A AE3GIS-FW -p tcp --dport 22 -j DROP"
        );
    }

    #[test]
    fn test_host_default_route() {
        let container = Container::new("h1", "PLC", ContainerType::Plc, "10.0.1.10");
        let mut plan = container_plan(
            "h1",
            ContainerType::Plc,
            "10.0.1.10",
            vec![iface("eth1", InterfaceRole::Home, Some("10.0.1.10/24"))],
        );
        plan.routes.push(StaticRoute::default_via("10.0.1.1".parse().unwrap()));
        let node = synthesize(&container, &plan, "abcd1234", &CompilerConfig::default());

        assert_eq!(
            node.exec,
            vec![
                "ip addr add 10.0.1.10/24 dev eth1",
                "ip route replace default via 10.0.1.1",
            ]
        );
    }

    #[test]
    fn test_unattached_host_is_degraded() {
        let container = Container::new("h1", "PC", ContainerType::Workstation, "10.0.1.10");
        let plan = container_plan("h1", ContainerType::Workstation, "10.0.1.10", Vec::new());
        let node = synthesize(&container, &plan, "abcd1234", &CompilerConfig::default());
        assert!(node.exec.is_empty());
        assert_eq!(node.degraded, vec![Degraded::UnboundAddress]);
    }

    #[test]
    fn test_normalize_persistence_path() {
        assert_eq!(normalize_persistence_path("var/lib/data/"), Some("/var/lib/data".to_string()));
        assert_eq!(normalize_persistence_path("/etc/../opt/./app"), Some("/opt/app".to_string()));
        assert_eq!(normalize_persistence_path("  / "), None);
        assert_eq!(normalize_persistence_path("../.."), None);
    }

    #[test]
    fn test_persistence_binds() {
        let mut container = Container::new("h1", "Historian", ContainerType::FileServer, "10.0.1.20");
        container.persistence_paths = vec!["/var/lib/db".to_string(), "var/lib/db/".to_string(), "/".to_string()];
        let binds = persistence_binds(&container, "abcd1234ef", &CompilerConfig::default());
        assert_eq!(
            binds,
            vec!["clab-workdir/persistent/abcd1234ef/h1/var_lib_db:/var/lib/db".to_string()]
        );
    }
}
