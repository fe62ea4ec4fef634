//! IPv4 network helpers.
//!
//! Thin wrappers over `ipnet` that pin down what "usable host" means for
//! this crate: the network and broadcast addresses are never handed out, so
//! `/31` and `/32` subnets have no usable hosts at all.

use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Malformed address input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid IPv4 CIDR '{0}'")]
    InvalidCidr(String),
    #[error("invalid IPv4 address '{0}'")]
    InvalidIp(String),
}

/// Parse an IPv4 network in CIDR form. Host bits are cleared.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net, AddressError> {
    cidr.trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|_| AddressError::InvalidCidr(cidr.to_string()))
}

pub fn parse_ip(ip: &str) -> Result<Ipv4Addr, AddressError> {
    ip.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| AddressError::InvalidIp(ip.to_string()))
}

/// Every assignable host address of `net`, lowest first.
pub fn usable_hosts(net: &Ipv4Net) -> impl Iterator<Item = Ipv4Addr> {
    let (first, last) = if net.prefix_len() <= 30 {
        (
            u32::from(net.network()) + 1,
            u32::from(net.broadcast()) - 1,
        )
    } else {
        (1, 0)
    };
    (first..=last).map(Ipv4Addr::from)
}

/// True if `ip` lies strictly between the network and broadcast addresses.
pub fn is_usable_host(net: &Ipv4Net, ip: Ipv4Addr) -> bool {
    net.prefix_len() <= 30 && net.contains(&ip) && ip != net.network() && ip != net.broadcast()
}

/// The `n`th usable host (0-based): `0` is the first host after the network address.
pub fn nth_usable_host(net: &Ipv4Net, n: usize) -> Option<Ipv4Addr> {
    usable_hosts(net).nth(n)
}

/// Lowest usable host not present in `used`.
pub fn next_free_host(net: &Ipv4Net, used: &HashSet<Ipv4Addr>) -> Option<Ipv4Addr> {
    usable_hosts(net).find(|ip| !used.contains(ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr_normalizes_host_bits() {
        let net = parse_cidr("10.0.1.77/24").unwrap();
        assert_eq!(net.to_string(), "10.0.1.0/24");
        assert!(parse_cidr("10.0.1.0").is_err());
        assert!(parse_cidr("300.0.0.0/24").is_err());
    }

    #[test]
    fn test_usable_hosts_exclude_network_and_broadcast() {
        let net = parse_cidr("10.0.1.0/29").unwrap();
        let hosts: Vec<String> = usable_hosts(&net).map(|ip| ip.to_string()).collect();
        assert_eq!(
            hosts,
            vec!["10.0.1.1", "10.0.1.2", "10.0.1.3", "10.0.1.4", "10.0.1.5", "10.0.1.6"]
        );
        assert!(!is_usable_host(&net, "10.0.1.0".parse().unwrap()));
        assert!(!is_usable_host(&net, "10.0.1.7".parse().unwrap()));
        assert!(!is_usable_host(&net, "10.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_tiny_subnets_have_no_usable_hosts() {
        assert_eq!(usable_hosts(&parse_cidr("10.0.0.0/31").unwrap()).count(), 0);
        assert_eq!(usable_hosts(&parse_cidr("10.0.0.1/32").unwrap()).count(), 0);
        assert_eq!(usable_hosts(&parse_cidr("10.0.0.0/30").unwrap()).count(), 2);
    }

    #[test]
    fn test_next_free_host_skips_used() {
        let net = parse_cidr("192.168.5.0/24").unwrap();
        let used: HashSet<Ipv4Addr> = ["192.168.5.1", "192.168.5.2"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(next_free_host(&net, &used), Some("192.168.5.3".parse().unwrap()));
        assert_eq!(nth_usable_host(&net, 1), Some("192.168.5.2".parse().unwrap()));
    }
}
