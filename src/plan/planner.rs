//! Address & interface planner.
//!
//! One deterministic pass over an immutable topology:
//!
//! - **A.** record each container's home subnet, CIDR and primary address;
//! - **C.** resolve subnet/site link endpoints to concrete gateway containers
//!   (cached `fromContainer`/`toContainer` first, else the first router or
//!   firewall in containment order);
//! - **B.** reserve pinned interface names, then number every remaining link
//!   endpoint `ethN` in link order, skipping reserved names;
//! - **D.** bind primary addresses to home interfaces and number each
//!   cross-subnet link from the point-to-point block;
//! - **E.** derive static routes: gateways route to each peer's home subnet,
//!   hosts get a single default route via their subnet gateway.
//!
//! Endpoint resolution runs before numbering because pinned names on
//! subnet/site links must be reserved on the concrete container.
//! Links are processed in a fixed order (subnet links, then inter-subnet,
//! then inter-site, each in containment order), so the lowest interface
//! numbers always land on a container's own LAN.

use ipnet::Ipv4Net;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;

use super::types::{
    AddressPlan, ContainerPlan, Endpoint, InterfaceRole, LinkScope, PlanError, PlanWarning,
    PlannedInterface, PlannedLink, StaticRoute,
};
use crate::ip::cidr::{is_usable_host, parse_cidr, parse_ip, usable_hosts};
use crate::ip::registry::interface_index;
use crate::ip::{InterfaceRegistry, LinkAllocator};
use crate::node::Role;
use crate::topology::{Connection, Container, Site, Subnet, Topology};

/// Planner knobs, normally taken from the compiler configuration.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Block carved into `/30`s for cross-subnet links.
    pub link_block: Ipv4Net,
    /// First auto-numbered interface suffix.
    pub first_interface_index: u32,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            link_block: Ipv4Net::new(Ipv4Addr::new(10, 255, 0, 0), 24).unwrap_or_default(),
            first_interface_index: 1,
        }
    }
}

/// Step A record.
struct Home<'a> {
    container: &'a Container,
    subnet_id: &'a str,
    cidr: Ipv4Net,
    ip: Ipv4Addr,
    gateway: Option<Ipv4Addr>,
}

/// A link with concrete endpoints but possibly unnamed interfaces.
struct ResolvedLink<'a> {
    scope: LinkScope,
    conn: &'a Connection,
    from: &'a str,
    to: &'a str,
}

/// Build the address plan for `topology`.
pub fn plan(topology: &Topology, options: &PlannerOptions) -> Result<AddressPlan, PlanError> {
    let homes = collect_homes(topology)?;
    let links = resolve_links(topology, &homes)?;

    // Step B: pinned names first, then auto-numbering in link order.
    let mut registry = InterfaceRegistry::new(options.first_interface_index);
    for link in &links {
        if let Some(name) = &link.conn.from_interface {
            registry.reserve(link.from, name)?;
        }
        if let Some(name) = &link.conn.to_interface {
            registry.reserve(link.to, name)?;
        }
    }

    let mut allocator = LinkAllocator::new(options.link_block)?;
    let mut interfaces: HashMap<&str, BTreeMap<String, PlannedInterface>> = HashMap::new();
    let mut planned_links = Vec::with_capacity(links.len());

    for link in &links {
        let from_iface = match &link.conn.from_interface {
            Some(name) => name.clone(),
            None => registry.next(link.from),
        };
        let to_iface = match &link.conn.to_interface {
            Some(name) => name.clone(),
            None => registry.next(link.to),
        };

        // Step D
        let block = if link.scope.is_point_to_point() {
            let block = allocator.allocate()?;
            let from_home = &homes[link.from];
            let to_home = &homes[link.to];
            insert_interface(
                &mut interfaces,
                link.from,
                PlannedInterface {
                    name: from_iface.clone(),
                    role: InterfaceRole::PointToPoint {
                        peer: link.to.to_string(),
                        peer_address: block.b,
                        peer_subnet: to_home.cidr,
                    },
                    address: Some(host_net(block.a, block.network)),
                },
            );
            insert_interface(
                &mut interfaces,
                link.to,
                PlannedInterface {
                    name: to_iface.clone(),
                    role: InterfaceRole::PointToPoint {
                        peer: link.from.to_string(),
                        peer_address: block.a,
                        peer_subnet: from_home.cidr,
                    },
                    address: Some(host_net(block.b, block.network)),
                },
            );
            debug!(
                "Link {}:{} <-> {}:{} numbered {}",
                link.from, from_iface, link.to, to_iface, block.network
            );
            Some(block)
        } else {
            for (container, name) in [(link.from, &from_iface), (link.to, &to_iface)] {
                let home = &homes[container];
                let has_home = interfaces
                    .get(container)
                    .map_or(false, |ifaces| ifaces.values().any(|i| i.role == InterfaceRole::Home));
                let interface = if Role::of(home.container.container_type) == Role::Switch || has_home {
                    PlannedInterface {
                        name: name.clone(),
                        role: InterfaceRole::Member,
                        address: None,
                    }
                } else {
                    PlannedInterface {
                        name: name.clone(),
                        role: InterfaceRole::Home,
                        address: Some(host_net(home.ip, home.cidr)),
                    }
                };
                insert_interface(&mut interfaces, container, interface);
            }
            None
        };

        planned_links.push(PlannedLink {
            scope: link.scope,
            a: Endpoint {
                container: link.from.to_string(),
                interface: from_iface,
            },
            b: Endpoint {
                container: link.to.to_string(),
                interface: to_iface,
            },
            label: link.conn.label.clone(),
            block,
        });
    }

    // Step E
    let mut warnings = Vec::new();
    let mut containers = Vec::with_capacity(homes.len());
    for (_, container) in topology.containers() {
        let home = &homes[container.id.as_str()];
        let mut ifaces: Vec<PlannedInterface> = interfaces
            .remove(container.id.as_str())
            .map(|m| m.into_values().collect())
            .unwrap_or_default();
        ifaces.sort_by_key(|i| (interface_index(&i.name).unwrap_or(u32::MAX), i.name.clone()));

        let role = Role::of(container.container_type);
        if role != Role::Switch && !ifaces.iter().any(|i| i.role == InterfaceRole::Home) {
            warn!(
                "Container {} ({}) has no link into its subnet; primary address {} stays unbound",
                container.name, container.id, home.ip
            );
            warnings.push(PlanWarning::Unattached {
                container: container.id.clone(),
            });
        }

        let routes = match role {
            Role::Router => peer_routes(home, &ifaces),
            Role::Host => match home.gateway.filter(|gw| *gw != home.ip) {
                Some(gateway) => vec![StaticRoute::default_via(gateway)],
                None => {
                    warn!("Host {} ({}) has no gateway; no default route", container.name, container.id);
                    warnings.push(PlanWarning::NoGateway {
                        container: container.id.clone(),
                    });
                    Vec::new()
                }
            },
            Role::Switch => Vec::new(),
        };

        containers.push(ContainerPlan {
            container_id: container.id.clone(),
            name: container.name.clone(),
            container_type: container.container_type,
            subnet_id: home.subnet_id.to_string(),
            home_cidr: home.cidr,
            primary_ip: home.ip,
            gateway: home.gateway,
            interfaces: ifaces,
            routes,
        });
    }

    info!(
        "Planned {} containers, {} links ({} point-to-point of {} available)",
        containers.len(),
        planned_links.len(),
        allocator.allocated(),
        allocator.capacity()
    );

    Ok(AddressPlan {
        containers,
        links: planned_links,
        warnings,
    })
}

fn host_net(ip: Ipv4Addr, network: Ipv4Net) -> Ipv4Net {
    Ipv4Net::new(ip, network.prefix_len()).unwrap_or(network)
}

fn insert_interface<'a>(
    interfaces: &mut HashMap<&'a str, BTreeMap<String, PlannedInterface>>,
    container: &'a str,
    interface: PlannedInterface,
) {
    interfaces
        .entry(container)
        .or_default()
        .insert(interface.name.clone(), interface);
}

/// One route per distinct peer subnet, first link wins.
fn peer_routes(home: &Home<'_>, interfaces: &[PlannedInterface]) -> Vec<StaticRoute> {
    let mut seen = HashSet::new();
    let mut routes = Vec::new();
    for interface in interfaces {
        if let InterfaceRole::PointToPoint { peer_address, peer_subnet, .. } = &interface.role {
            if *peer_subnet == home.cidr || !seen.insert(*peer_subnet) {
                continue;
            }
            routes.push(StaticRoute {
                destination: *peer_subnet,
                via: *peer_address,
            });
        }
    }
    routes
}

/// Step A: home subnet, CIDR, primary address and gateway of every container.
fn collect_homes(topology: &Topology) -> Result<HashMap<&str, Home<'_>>, PlanError> {
    let mut homes = HashMap::new();
    let mut ids: HashSet<&str> = HashSet::new();

    for site in &topology.sites {
        if !ids.insert(&site.id) {
            return Err(PlanError::DuplicateId(site.id.clone()));
        }
        for subnet in &site.subnets {
            if !ids.insert(&subnet.id) {
                return Err(PlanError::DuplicateId(subnet.id.clone()));
            }
            let cidr = parse_cidr(&subnet.cidr).map_err(|source| PlanError::InvalidAddress {
                entity: format!("subnet {}", subnet.id),
                source,
            })?;
            if usable_hosts(&cidr).next().is_none() {
                return Err(PlanError::NoUsableAddresses {
                    subnet: subnet.id.clone(),
                    cidr,
                });
            }
            let gateway = subnet_gateway(subnet)?;

            for container in &subnet.containers {
                if !ids.insert(&container.id) {
                    return Err(PlanError::DuplicateId(container.id.clone()));
                }
                let ip = parse_ip(&container.ip).map_err(|source| PlanError::InvalidAddress {
                    entity: format!("container {}", container.id),
                    source,
                })?;
                if !is_usable_host(&cidr, ip) {
                    return Err(PlanError::IpOutsideSubnet {
                        container: container.id.clone(),
                        ip: container.ip.clone(),
                        cidr,
                    });
                }
                homes.insert(
                    container.id.as_str(),
                    Home {
                        container,
                        subnet_id: &subnet.id,
                        cidr,
                        ip,
                        gateway,
                    },
                );
            }
        }
    }
    Ok(homes)
}

/// Explicit gateway, else the first router or firewall of the subnet.
fn subnet_gateway(subnet: &Subnet) -> Result<Option<Ipv4Addr>, PlanError> {
    let explicit = subnet
        .gateway
        .as_deref()
        .map(str::trim)
        .filter(|gw| !gw.is_empty());
    match explicit {
        Some(gateway) => parse_ip(gateway)
            .map(Some)
            .map_err(|source| PlanError::InvalidAddress {
                entity: format!("gateway of subnet {}", subnet.id),
                source,
            }),
        None => Ok(subnet.first_gateway().and_then(|c| parse_ip(&c.ip).ok())),
    }
}

/// Step C: turn every connection into a link between two known containers.
fn resolve_links<'a>(
    topology: &'a Topology,
    homes: &HashMap<&str, Home<'a>>,
) -> Result<Vec<ResolvedLink<'a>>, PlanError> {
    let mut links = Vec::new();

    for subnet in topology.subnets() {
        for conn in &subnet.connections {
            let from = direct_endpoint(conn, &conn.from, homes)?;
            let to = direct_endpoint(conn, &conn.to, homes)?;
            links.push(checked_link(LinkScope::Subnet, conn, from, to)?);
        }
    }

    for site in &topology.sites {
        for conn in &site.subnet_connections {
            let from = subnet_endpoint(site, conn, &conn.from, conn.from_container.as_deref(), homes)?;
            let to = subnet_endpoint(site, conn, &conn.to, conn.to_container.as_deref(), homes)?;
            links.push(checked_link(LinkScope::InterSubnet, conn, from, to)?);
        }
    }

    for conn in &topology.site_connections {
        let from = site_endpoint(topology, conn, &conn.from, conn.from_container.as_deref(), homes)?;
        let to = site_endpoint(topology, conn, &conn.to, conn.to_container.as_deref(), homes)?;
        links.push(checked_link(LinkScope::InterSite, conn, from, to)?);
    }

    Ok(links)
}

fn checked_link<'a>(
    scope: LinkScope,
    conn: &'a Connection,
    from: &'a str,
    to: &'a str,
) -> Result<ResolvedLink<'a>, PlanError> {
    if from == to {
        return Err(PlanError::SelfLink {
            from: conn.from.clone(),
            to: conn.to.clone(),
            container: from.to_string(),
        });
    }
    Ok(ResolvedLink { scope, conn, from, to })
}

fn unresolvable(conn: &Connection, endpoint: &str) -> PlanError {
    PlanError::UnresolvableEndpoint {
        from: conn.from.clone(),
        to: conn.to.clone(),
        endpoint: endpoint.to_string(),
    }
}

fn direct_endpoint<'a>(
    conn: &Connection,
    id: &str,
    homes: &HashMap<&str, Home<'a>>,
) -> Result<&'a str, PlanError> {
    homes
        .get(id)
        .map(|home| home.container.id.as_str())
        .ok_or_else(|| unresolvable(conn, id))
}

/// A container named directly on a cross-level link must route.
fn gateway_endpoint<'a>(
    conn: &Connection,
    id: &str,
    homes: &HashMap<&str, Home<'a>>,
) -> Result<&'a str, PlanError> {
    homes
        .get(id)
        .filter(|home| home.container.container_type.is_gateway())
        .map(|home| home.container.id.as_str())
        .ok_or_else(|| unresolvable(conn, id))
}

fn gateway_in<'a>(subnet: &'a Subnet, cached: Option<&str>) -> Option<&'a str> {
    cached
        .and_then(|id| subnet.container(id))
        .filter(|c| c.container_type.is_gateway())
        .or_else(|| subnet.first_gateway())
        .map(|c| c.id.as_str())
}

/// A subnet endpoint resolves to its gateway. An id naming a container
/// directly is accepted only when that container is a router or firewall.
fn subnet_endpoint<'a>(
    site: &'a Site,
    conn: &Connection,
    id: &str,
    cached: Option<&str>,
    homes: &HashMap<&str, Home<'a>>,
) -> Result<&'a str, PlanError> {
    match site.subnet(id) {
        Some(subnet) => gateway_in(subnet, cached).ok_or_else(|| unresolvable(conn, id)),
        None => gateway_endpoint(conn, id, homes),
    }
}

fn site_endpoint<'a>(
    topology: &'a Topology,
    conn: &Connection,
    id: &str,
    cached: Option<&str>,
    homes: &HashMap<&str, Home<'a>>,
) -> Result<&'a str, PlanError> {
    match topology.site(id) {
        Some(site) => {
            let cached = cached.filter(|c| {
                site.subnets
                    .iter()
                    .any(|s| s.container(c).map_or(false, |x| x.container_type.is_gateway()))
            });
            match cached {
                Some(c) => gateway_endpoint(conn, c, homes),
                None => site
                    .first_gateway()
                    .map(|c| c.id.as_str())
                    .ok_or_else(|| unresolvable(conn, id)),
            }
        }
        None => gateway_endpoint(conn, id, homes),
    }
}
