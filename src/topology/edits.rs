//! Structural mutation engine.
//!
//! Every editor action is one [`Edit`]. [`Topology::apply`] performs it on a
//! draft copy and only commits when the edit succeeds, so a failed edit
//! leaves the topology untouched. After each applied edit the topology is
//! re-normalised: connections whose endpoints disappeared are dropped and
//! cached gateway containers on subnet/site links are re-resolved.
//!
//! Edits that reference a missing parent (a deleted site, an unknown subnet)
//! are ignored rather than reported as errors; the editor's navigation is
//! expected to prevent them in the first place.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

use super::ids::IdGenerator;
use super::types::{Connection, Container, ContainerType, Position, Site, Subnet, Topology};
use crate::ip::cidr::{
    is_usable_host, next_free_host, nth_usable_host, parse_cidr, parse_ip, AddressError,
};

/// Rejected edits. The topology is unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("address {ip} is not a usable host of {cidr}")]
    IpOutsideSubnet { ip: String, cidr: String },
    #[error("address {ip} is already used in subnet {subnet}")]
    DuplicateIp { ip: String, subnet: String },
    #[error("subnet {cidr} has no free host address left")]
    SubnetFull { cidr: String },
    #[error("site {site} has no subnet to host a gateway router")]
    UnresolvableSite { site: String },
}

/// Partial update of a site. Child collections are never touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SitePatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubnetPatch {
    pub name: Option<String>,
    pub cidr: Option<String>,
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub container_type: Option<ContainerType>,
    pub ip: Option<String>,
    pub image: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

/// One editor action, serialised as `{"type": "ADD_SUBNET", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all_fields = "camelCase")]
pub enum Edit {
    AddSite {
        name: String,
        #[serde(default)]
        location: String,
        #[serde(default)]
        position: Position,
    },
    UpdateSite {
        id: String,
        patch: SitePatch,
    },
    DeleteSite {
        id: String,
    },
    AddSubnet {
        site_id: String,
        name: String,
        cidr: String,
    },
    UpdateSubnet {
        id: String,
        patch: SubnetPatch,
    },
    DeleteSubnet {
        id: String,
    },
    AddContainer {
        subnet_id: String,
        name: String,
        #[serde(rename = "type")]
        container_type: ContainerType,
        /// Explicit address; the lowest free host is used when absent.
        #[serde(default)]
        ip: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
    UpdateContainer {
        id: String,
        patch: ContainerPatch,
    },
    DeleteContainer {
        id: String,
    },
    ConnectContainers {
        subnet_id: String,
        from: String,
        to: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        from_interface: Option<String>,
        #[serde(default)]
        to_interface: Option<String>,
    },
    DisconnectContainers {
        subnet_id: String,
        from: String,
        to: String,
    },
    ConnectSubnets {
        site_id: String,
        from: String,
        to: String,
        #[serde(default)]
        label: Option<String>,
    },
    DisconnectSubnets {
        site_id: String,
        from: String,
        to: String,
    },
    ConnectSites {
        from: String,
        to: String,
        #[serde(default)]
        label: Option<String>,
    },
    DisconnectSites {
        from: String,
        to: String,
    },
}

/// Result of a successful [`Topology::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The edit changed the topology; `created` lists new entity ids in creation order.
    Applied { created: Vec<String> },
    /// The edit referenced something missing or redundant and was skipped.
    Ignored { reason: String },
}

impl Outcome {
    fn ignored(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        debug!("Edit ignored: {}", reason);
        Outcome::Ignored { reason }
    }

    fn applied(created: Vec<String>) -> Self {
        Outcome::Applied { created }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }

    /// Ids created by the edit (empty when ignored).
    pub fn created(&self) -> &[String] {
        match self {
            Outcome::Applied { created } => created,
            Outcome::Ignored { .. } => &[],
        }
    }
}

impl Topology {
    /// Apply one edit atomically and restore structural consistency.
    pub fn apply(&mut self, edit: Edit, ids: &mut dyn IdGenerator) -> Result<Outcome, EditError> {
        let mut draft = self.clone();
        let outcome = draft.apply_in_place(edit, ids)?;
        if outcome.is_applied() {
            draft.normalize();
            *self = draft;
        }
        Ok(outcome)
    }

    /// Apply a sequence of edits, stopping at the first rejected one.
    pub fn apply_all(
        &mut self,
        edits: impl IntoIterator<Item = Edit>,
        ids: &mut dyn IdGenerator,
    ) -> Result<Vec<Outcome>, EditError> {
        edits.into_iter().map(|edit| self.apply(edit, ids)).collect()
    }

    fn apply_in_place(&mut self, edit: Edit, ids: &mut dyn IdGenerator) -> Result<Outcome, EditError> {
        match edit {
            Edit::AddSite { name, location, position } => {
                let id = ids.next_id();
                self.sites.push(Site {
                    id: id.clone(),
                    name,
                    location,
                    position,
                    subnets: Vec::new(),
                    subnet_connections: Vec::new(),
                });
                Ok(Outcome::applied(vec![id]))
            }
            Edit::UpdateSite { id, patch } => {
                let Some(site) = self.site_mut(&id) else {
                    return Ok(Outcome::ignored(format!("site {} does not exist", id)));
                };
                if let Some(name) = patch.name {
                    site.name = name;
                }
                if let Some(location) = patch.location {
                    site.location = location;
                }
                if let Some(position) = patch.position {
                    site.position = position;
                }
                Ok(Outcome::applied(Vec::new()))
            }
            Edit::DeleteSite { id } => {
                let before = self.sites.len();
                self.sites.retain(|s| s.id != id);
                if self.sites.len() == before {
                    return Ok(Outcome::ignored(format!("site {} does not exist", id)));
                }
                Ok(Outcome::applied(Vec::new()))
            }
            Edit::AddSubnet { site_id, name, cidr } => {
                let Some(site) = self.site_mut(&site_id) else {
                    return Ok(Outcome::ignored(format!("site {} does not exist", site_id)));
                };
                let subnet = provision_subnet(name, &cidr, ids)?;
                let created = std::iter::once(subnet.id.clone())
                    .chain(subnet.containers.iter().map(|c| c.id.clone()))
                    .collect();
                site.subnets.push(subnet);
                Ok(Outcome::applied(created))
            }
            Edit::UpdateSubnet { id, patch } => {
                let Some(subnet) = self.subnet_mut(&id) else {
                    return Ok(Outcome::ignored(format!("subnet {} does not exist", id)));
                };
                patch_subnet(subnet, patch)?;
                Ok(Outcome::applied(Vec::new()))
            }
            Edit::DeleteSubnet { id } => {
                let mut removed = false;
                for site in &mut self.sites {
                    let before = site.subnets.len();
                    site.subnets.retain(|s| s.id != id);
                    removed |= site.subnets.len() != before;
                }
                if !removed {
                    return Ok(Outcome::ignored(format!("subnet {} does not exist", id)));
                }
                Ok(Outcome::applied(Vec::new()))
            }
            Edit::AddContainer { subnet_id, name, container_type, ip, image } => {
                let Some(subnet) = self.subnet_mut(&subnet_id) else {
                    return Ok(Outcome::ignored(format!("subnet {} does not exist", subnet_id)));
                };
                let address = match ip {
                    Some(ip) => checked_host_ip(subnet, &ip, None)?,
                    None => free_host_ip(subnet)?,
                };
                let mut container = Container::new(ids.next_id(), name, container_type, address.to_string());
                container.image = image;
                let id = container.id.clone();
                subnet.containers.push(container);
                Ok(Outcome::applied(vec![id]))
            }
            Edit::UpdateContainer { id, patch } => {
                let Some(subnet) = self
                    .sites
                    .iter_mut()
                    .flat_map(|site| site.subnets.iter_mut())
                    .find(|s| s.container(&id).is_some())
                else {
                    return Ok(Outcome::ignored(format!("container {} does not exist", id)));
                };
                let address = match &patch.ip {
                    Some(ip) => Some(checked_host_ip(subnet, ip, Some(&id))?),
                    None => None,
                };
                let Some(container) = subnet.containers.iter_mut().find(|c| c.id == id) else {
                    return Ok(Outcome::ignored(format!("container {} does not exist", id)));
                };
                let previous = container.clone();
                if let Some(name) = patch.name {
                    container.name = name;
                }
                if let Some(container_type) = patch.container_type {
                    container.container_type = container_type;
                }
                if let Some(address) = address {
                    container.ip = address.to_string();
                }
                if let Some(image) = patch.image {
                    container.image = Some(image);
                }
                if let Some(metadata) = patch.metadata {
                    container.metadata = Some(metadata);
                }
                refresh_subnet_gateway(subnet, &previous);
                Ok(Outcome::applied(Vec::new()))
            }
            Edit::DeleteContainer { id } => {
                let mut removed = false;
                for subnet in self.sites.iter_mut().flat_map(|site| site.subnets.iter_mut()) {
                    if let Some(index) = subnet.containers.iter().position(|c| c.id == id) {
                        let container = subnet.containers.remove(index);
                        refresh_subnet_gateway(subnet, &container);
                        removed = true;
                    }
                }
                if !removed {
                    return Ok(Outcome::ignored(format!("container {} does not exist", id)));
                }
                Ok(Outcome::applied(Vec::new()))
            }
            Edit::ConnectContainers { subnet_id, from, to, label, from_interface, to_interface } => {
                let Some(subnet) = self.subnet_mut(&subnet_id) else {
                    return Ok(Outcome::ignored(format!("subnet {} does not exist", subnet_id)));
                };
                if from == to {
                    return Ok(Outcome::ignored("cannot connect a container to itself"));
                }
                if subnet.container(&from).is_none() || subnet.container(&to).is_none() {
                    return Ok(Outcome::ignored(format!(
                        "{} and {} are not both in subnet {}",
                        from, to, subnet_id
                    )));
                }
                if subnet.connections.iter().any(|c| c.joins(&from, &to)) {
                    return Ok(Outcome::ignored(format!("{} and {} are already connected", from, to)));
                }
                subnet.connections.push(Connection {
                    from,
                    to,
                    label,
                    from_interface,
                    to_interface,
                    from_container: None,
                    to_container: None,
                });
                Ok(Outcome::applied(Vec::new()))
            }
            Edit::DisconnectContainers { subnet_id, from, to } => {
                let Some(subnet) = self.subnet_mut(&subnet_id) else {
                    return Ok(Outcome::ignored(format!("subnet {} does not exist", subnet_id)));
                };
                Ok(remove_edge(&mut subnet.connections, &from, &to))
            }
            Edit::ConnectSubnets { site_id, from, to, label } => {
                let Some(site) = self.site_mut(&site_id) else {
                    return Ok(Outcome::ignored(format!("site {} does not exist", site_id)));
                };
                connect_subnets(site, from, to, label, ids)
            }
            Edit::DisconnectSubnets { site_id, from, to } => {
                let Some(site) = self.site_mut(&site_id) else {
                    return Ok(Outcome::ignored(format!("site {} does not exist", site_id)));
                };
                Ok(remove_edge(&mut site.subnet_connections, &from, &to))
            }
            Edit::ConnectSites { from, to, label } => self.connect_sites(from, to, label, ids),
            Edit::DisconnectSites { from, to } => Ok(remove_edge(&mut self.site_connections, &from, &to)),
        }
    }

    fn connect_sites(
        &mut self,
        from: String,
        to: String,
        label: Option<String>,
        ids: &mut dyn IdGenerator,
    ) -> Result<Outcome, EditError> {
        if from == to {
            return Ok(Outcome::ignored("cannot connect a site to itself"));
        }
        if self.site(&from).is_none() || self.site(&to).is_none() {
            return Ok(Outcome::ignored(format!("site {} or {} does not exist", from, to)));
        }
        if self.site_connections.iter().any(|c| c.joins(&from, &to)) {
            return Ok(Outcome::ignored(format!("sites {} and {} are already connected", from, to)));
        }

        let mut created = Vec::new();
        let mut resolved = Vec::with_capacity(2);
        for site_id in [&from, &to] {
            let Some(site) = self.site_mut(site_id) else {
                return Ok(Outcome::ignored(format!("site {} does not exist", site_id)));
            };
            resolved.push(ensure_site_gateway(site, ids, &mut created)?);
        }
        let to_container = resolved.pop();
        let from_container = resolved.pop();

        self.site_connections.push(Connection {
            from,
            to,
            label,
            from_container,
            to_container,
            ..Default::default()
        });
        Ok(Outcome::applied(created))
    }

    /// Drop connections with vanished endpoints and refresh cached gateway ids.
    pub fn normalize(&mut self) {
        for site in &mut self.sites {
            for subnet in &mut site.subnets {
                let Subnet { containers, connections, .. } = subnet;
                connections.retain(|c| {
                    let keep = containers.iter().any(|x| x.id == c.from) && containers.iter().any(|x| x.id == c.to);
                    if !keep {
                        debug!("Dropping dangling connection {} -> {}", c.from, c.to);
                    }
                    keep
                });
            }

            let Site { subnets, subnet_connections, .. } = site;
            subnet_connections.retain_mut(|c| {
                let (Some(from), Some(to)) = (
                    subnets.iter().find(|s| s.id == c.from),
                    subnets.iter().find(|s| s.id == c.to),
                ) else {
                    debug!("Dropping subnet connection {} -> {}: subnet removed", c.from, c.to);
                    return false;
                };
                let keep = refresh_cache(&mut c.from_container, |id| subnet_gateway(from, id), from.first_gateway())
                    && refresh_cache(&mut c.to_container, |id| subnet_gateway(to, id), to.first_gateway());
                if !keep {
                    debug!("Dropping subnet connection {} -> {}: no gateway left", c.from, c.to);
                }
                keep
            });
        }

        let Topology { sites, site_connections, .. } = self;
        site_connections.retain_mut(|c| {
            let (Some(from), Some(to)) = (
                sites.iter().find(|s| s.id == c.from),
                sites.iter().find(|s| s.id == c.to),
            ) else {
                debug!("Dropping site connection {} -> {}: site removed", c.from, c.to);
                return false;
            };
            let keep = refresh_cache(&mut c.from_container, |id| site_gateway(from, id), from.first_gateway())
                && refresh_cache(&mut c.to_container, |id| site_gateway(to, id), to.first_gateway());
            if !keep {
                debug!("Dropping site connection {} -> {}: no gateway left", c.from, c.to);
            }
            keep
        });
    }
}

fn subnet_gateway(subnet: &Subnet, id: &str) -> bool {
    subnet.container(id).map_or(false, |c| c.container_type.is_gateway())
}

fn site_gateway(site: &Site, id: &str) -> bool {
    site.subnets.iter().any(|s| subnet_gateway(s, id))
}

/// Keep a still-valid cached id, otherwise fall back to the first gateway.
fn refresh_cache(cached: &mut Option<String>, is_valid: impl Fn(&str) -> bool, fallback: Option<&Container>) -> bool {
    if cached.as_deref().map_or(false, is_valid) {
        return true;
    }
    match fallback {
        Some(container) => {
            *cached = Some(container.id.clone());
            true
        }
        None => false,
    }
}

/// Re-point the subnet gateway when `previous` (a container's state before
/// an edit) held it and no router or firewall holds that address any more.
fn refresh_subnet_gateway(subnet: &mut Subnet, previous: &Container) {
    if !previous.container_type.is_gateway() || subnet.gateway.as_deref() != Some(previous.ip.as_str()) {
        return;
    }
    let still_held = subnet
        .containers
        .iter()
        .any(|c| c.container_type.is_gateway() && c.ip == previous.ip);
    if still_held {
        return;
    }
    subnet.gateway = subnet.first_gateway().map(|c| c.ip.clone());
    match &subnet.gateway {
        Some(gateway) => info!("Subnet {} gateway moved to {}", subnet.name, gateway),
        None => info!("Subnet {} has no gateway left", subnet.name),
    }
}

fn remove_edge(connections: &mut Vec<Connection>, from: &str, to: &str) -> Outcome {
    let before = connections.len();
    connections.retain(|c| !c.joins(from, to));
    if connections.len() == before {
        return Outcome::ignored(format!("no connection between {} and {}", from, to));
    }
    Outcome::applied(Vec::new())
}

fn used_addresses(subnet: &Subnet, exclude: Option<&str>) -> HashSet<Ipv4Addr> {
    subnet
        .containers
        .iter()
        .filter(|c| Some(c.id.as_str()) != exclude)
        .filter_map(|c| parse_ip(&c.ip).ok())
        .collect()
}

/// Validate `ip` as a free usable host of `subnet`, ignoring container `exclude`.
fn checked_host_ip(subnet: &Subnet, ip: &str, exclude: Option<&str>) -> Result<Ipv4Addr, EditError> {
    let net = parse_cidr(&subnet.cidr)?;
    let address = parse_ip(ip)?;
    if !is_usable_host(&net, address) {
        return Err(EditError::IpOutsideSubnet {
            ip: ip.to_string(),
            cidr: subnet.cidr.clone(),
        });
    }
    if used_addresses(subnet, exclude).contains(&address) {
        return Err(EditError::DuplicateIp {
            ip: ip.to_string(),
            subnet: subnet.id.clone(),
        });
    }
    Ok(address)
}

fn free_host_ip(subnet: &Subnet) -> Result<Ipv4Addr, EditError> {
    let net = parse_cidr(&subnet.cidr)?;
    next_free_host(&net, &used_addresses(subnet, None)).ok_or_else(|| EditError::SubnetFull {
        cidr: subnet.cidr.clone(),
    })
}

/// New subnet with its gateway router on the first usable host and a switch
/// on the second, wired switch -> router.
fn provision_subnet(name: String, cidr: &str, ids: &mut dyn IdGenerator) -> Result<Subnet, EditError> {
    let net = parse_cidr(cidr)?;
    let full = || EditError::SubnetFull { cidr: cidr.to_string() };
    let router_ip = nth_usable_host(&net, 0).ok_or_else(full)?;
    let switch_ip = nth_usable_host(&net, 1).ok_or_else(full)?;

    let subnet_id = ids.next_id();
    let router = Container::new(ids.next_id(), format!("{} Router", name), ContainerType::Router, router_ip.to_string());
    let switch = Container::new(ids.next_id(), format!("{} Switch", name), ContainerType::Switch, switch_ip.to_string());
    info!(
        "Provisioned subnet {} ({}) with router {} and switch {}",
        name, net, router_ip, switch_ip
    );

    Ok(Subnet {
        id: subnet_id,
        name,
        cidr: cidr.trim().to_string(),
        gateway: Some(router_ip.to_string()),
        connections: vec![Connection::new(switch.id.clone(), router.id.clone())],
        containers: vec![router, switch],
    })
}

/// Synthesize a gateway router on the next free host, uplink it to the
/// subnet's first switch and make it the subnet gateway.
fn provision_router(subnet: &mut Subnet, ids: &mut dyn IdGenerator) -> Result<String, EditError> {
    let address = free_host_ip(subnet)?;
    let router = Container::new(
        ids.next_id(),
        format!("{} Router", subnet.name),
        ContainerType::Router,
        address.to_string(),
    );
    let id = router.id.clone();

    if let Some(switch) = subnet.first_switch() {
        subnet.connections.push(Connection::new(switch.id.clone(), id.clone()));
    }
    subnet.gateway = Some(address.to_string());
    subnet.containers.push(router);
    info!("Synthesized gateway router {} for subnet {}", address, subnet.name);
    Ok(id)
}

fn ensure_subnet_gateway(
    subnet: &mut Subnet,
    ids: &mut dyn IdGenerator,
    created: &mut Vec<String>,
) -> Result<String, EditError> {
    if let Some(gateway) = subnet.first_gateway() {
        return Ok(gateway.id.clone());
    }
    let id = provision_router(subnet, ids)?;
    created.push(id.clone());
    Ok(id)
}

/// A site without any router gets one synthesized in its first subnet.
fn ensure_site_gateway(
    site: &mut Site,
    ids: &mut dyn IdGenerator,
    created: &mut Vec<String>,
) -> Result<String, EditError> {
    if let Some(gateway) = site.first_gateway() {
        return Ok(gateway.id.clone());
    }
    let site_id = site.id.clone();
    let subnet = site
        .subnets
        .first_mut()
        .ok_or(EditError::UnresolvableSite { site: site_id })?;
    ensure_subnet_gateway(subnet, ids, created)
}

fn connect_subnets(
    site: &mut Site,
    from: String,
    to: String,
    label: Option<String>,
    ids: &mut dyn IdGenerator,
) -> Result<Outcome, EditError> {
    if from == to {
        return Ok(Outcome::ignored("cannot connect a subnet to itself"));
    }
    if site.subnet(&from).is_none() || site.subnet(&to).is_none() {
        return Ok(Outcome::ignored(format!(
            "subnets {} and {} are not both in site {}",
            from, to, site.id
        )));
    }
    if site.subnet_connections.iter().any(|c| c.joins(&from, &to)) {
        return Ok(Outcome::ignored(format!("subnets {} and {} are already connected", from, to)));
    }

    let mut created = Vec::new();
    let mut resolved = Vec::with_capacity(2);
    for subnet_id in [&from, &to] {
        let Some(subnet) = site.subnets.iter_mut().find(|s| &s.id == subnet_id) else {
            return Ok(Outcome::ignored(format!("subnet {} does not exist", subnet_id)));
        };
        resolved.push(ensure_subnet_gateway(subnet, ids, &mut created)?);
    }
    let to_container = resolved.pop();
    let from_container = resolved.pop();

    site.subnet_connections.push(Connection {
        from,
        to,
        label,
        from_container,
        to_container,
        ..Default::default()
    });
    Ok(Outcome::applied(created))
}

fn patch_subnet(subnet: &mut Subnet, patch: SubnetPatch) -> Result<(), EditError> {
    let cidr = patch.cidr.unwrap_or_else(|| subnet.cidr.clone());
    let net = parse_cidr(&cidr)?;

    if let Some(stray) = subnet
        .containers
        .iter()
        .find(|c| parse_ip(&c.ip).map_or(true, |ip| !is_usable_host(&net, ip)))
    {
        return Err(EditError::IpOutsideSubnet {
            ip: stray.ip.clone(),
            cidr,
        });
    }
    if let Some(gateway) = &patch.gateway {
        let address = parse_ip(gateway)?;
        if !is_usable_host(&net, address) {
            return Err(EditError::IpOutsideSubnet {
                ip: gateway.clone(),
                cidr,
            });
        }
    }

    if let Some(name) = patch.name {
        subnet.name = name;
    }
    if let Some(gateway) = patch.gateway {
        subnet.gateway = Some(gateway);
    }
    subnet.cidr = cidr;
    Ok(())
}
