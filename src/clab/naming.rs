//! Deterministic deployment and management naming.
//!
//! Everything here is a pure function of the topology id (plus the topology
//! name and a retry attempt), so regenerating a topology always yields the
//! same deployment name, management network and management subnets.

use ipnet::{Ipv4Net, Ipv6Net};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Management `/24`s available inside `100.64.0.0/10`.
pub const MGMT_SLOTS: u32 = 64 * 256;
/// Slot stride between retry attempts. Prime, so retries spread over the pool.
pub const MGMT_ATTEMPT_STRIDE: u32 = 9973;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    #[error("topology id '{id}' must start with {len} hex characters")]
    InvalidTopologyId { id: String, len: usize },
}

/// Leading `len` characters of a topology id, checked to be hex.
pub fn id_prefix(topology_id: &str, len: usize) -> Result<&str, NamingError> {
    let invalid = || NamingError::InvalidTopologyId {
        id: topology_id.to_string(),
        len,
    };
    let prefix = topology_id.get(..len).ok_or_else(invalid)?;
    if prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(prefix)
    } else {
        Err(invalid())
    }
}

/// `{name}-{id prefix}`; `name` has already been defaulted by the caller.
pub fn deployment_name(name: &str, topology_id: &str, len: usize) -> Result<String, NamingError> {
    Ok(format!("{}-{}", name.trim(), id_prefix(topology_id, len)?))
}

/// Name containerlab gives the runtime container of `container_id`.
pub fn runtime_container_name(deployment: &str, container_id: &str) -> String {
    format!("clab-{}-{}", deployment, container_id)
}

/// Inverse of [`runtime_container_name`]; `None` for containers of other deployments.
pub fn container_id_from_runtime_name<'a>(deployment: &str, runtime_name: &'a str) -> Option<&'a str> {
    runtime_name
        .strip_prefix("clab-")
        .and_then(|rest| rest.strip_prefix(deployment))
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|id| !id.is_empty())
}

pub fn management_network_name(prefix: &str, topology_id: &str, len: usize) -> Result<String, NamingError> {
    Ok(format!("{}-{}", prefix, id_prefix(topology_id, len)?))
}

fn mgmt_slot(topology_id: &str, attempt: u32) -> Result<u32, NamingError> {
    // The seed always reads 8 hex digits (32 bits) regardless of the naming prefix.
    let seed_hex = id_prefix(topology_id, 8)?;
    let seed = u32::from_str_radix(seed_hex, 16).map_err(|_| NamingError::InvalidTopologyId {
        id: topology_id.to_string(),
        len: 8,
    })?;
    let offset = (u64::from(attempt) * u64::from(MGMT_ATTEMPT_STRIDE)) % u64::from(MGMT_SLOTS);
    Ok(((u64::from(seed) + offset) % u64::from(MGMT_SLOTS)) as u32)
}

/// `100.{64 + slot / 256}.{slot % 256}.0/24`
pub fn management_ipv4_subnet(topology_id: &str, attempt: u32) -> Result<Ipv4Net, NamingError> {
    let slot = mgmt_slot(topology_id, attempt)?;
    let addr = Ipv4Addr::new(100, (64 + slot / 256) as u8, (slot % 256) as u8, 0);
    Ok(Ipv4Net::new(addr, 24).unwrap_or_default())
}

/// `3fff:100:{64 + slot / 256}:{slot % 256}::/64`, written with decimal groups.
pub fn management_ipv6_subnet(topology_id: &str, attempt: u32) -> Result<Ipv6Net, NamingError> {
    let slot = mgmt_slot(topology_id, attempt)?;
    let group = |n: u32| -> u16 { u16::from_str_radix(&n.to_string(), 16).unwrap_or(0) };
    let addr = Ipv6Addr::new(0x3fff, 0x100, group(64 + slot / 256), group(slot % 256), 0, 0, 0, 0);
    Ok(Ipv6Net::new(addr, 64).unwrap_or_default())
}
