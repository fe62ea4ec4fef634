//! Interface name registry.
//!
//! Tracks which interface names each container already uses so that
//! explicitly pinned names (`fromInterface`/`toInterface`) are never handed
//! out again by auto-numbering.

use std::collections::{BTreeMap, BTreeSet};

/// A pinned interface name was claimed twice on the same container.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("interface {interface} is pinned more than once on container {container}")]
pub struct InterfaceConflict {
    pub container: String,
    pub interface: String,
}

/// Numeric suffix of an `ethN` name, if it has one.
pub fn interface_index(name: &str) -> Option<u32> {
    name.strip_prefix("eth").and_then(|n| n.parse().ok())
}

/// Per-container interface bookkeeping.
#[derive(Debug)]
pub struct InterfaceRegistry {
    base_index: u32,
    used: BTreeMap<String, BTreeSet<String>>,
    counters: BTreeMap<String, u32>,
}

impl InterfaceRegistry {
    /// `base_index` is the first auto-numbered suffix (`1` yields `eth1`).
    pub fn new(base_index: u32) -> Self {
        Self {
            base_index,
            used: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }

    /// Claim an explicitly named interface.
    pub fn reserve(&mut self, container: &str, interface: &str) -> Result<(), InterfaceConflict> {
        let names = self.used.entry(container.to_string()).or_default();
        if !names.insert(interface.to_string()) {
            return Err(InterfaceConflict {
                container: container.to_string(),
                interface: interface.to_string(),
            });
        }
        Ok(())
    }

    /// Hand out the lowest free `ethN` at or above the base index.
    pub fn next(&mut self, container: &str) -> String {
        let names = self.used.entry(container.to_string()).or_default();
        let counter = self
            .counters
            .entry(container.to_string())
            .or_insert(self.base_index);

        loop {
            let candidate = format!("eth{}", *counter);
            *counter += 1;
            if names.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_numbering_skips_reserved() {
        let mut registry = InterfaceRegistry::new(1);
        registry.reserve("r1", "eth2").unwrap();

        assert_eq!(registry.next("r1"), "eth1");
        assert_eq!(registry.next("r1"), "eth3");
        assert_eq!(registry.next("r2"), "eth1");
        assert!(registry.reserve("r1", "eth3").is_err());
    }

    #[test]
    fn test_double_reservation_conflicts() {
        let mut registry = InterfaceRegistry::new(1);
        registry.reserve("r1", "eth5").unwrap();
        let err = registry.reserve("r1", "eth5").unwrap_err();
        assert_eq!(err.interface, "eth5");
        assert!(registry.reserve("r2", "eth5").is_ok());
    }

    #[test]
    fn test_base_index_and_interface_index() {
        let mut registry = InterfaceRegistry::new(0);
        registry.reserve("s1", "eth1").unwrap();
        registry.reserve("s1", "lan0").unwrap();
        assert_eq!(registry.next("s1"), "eth0");
        assert_eq!(registry.next("s1"), "eth2");
        assert_eq!(interface_index("eth12"), Some(12));
        assert_eq!(interface_index("br0"), None);
    }
}
