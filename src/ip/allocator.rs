//! Point-to-point link address allocation.
//!
//! Cross-subnet router links are numbered out of a dedicated block (a `/24`
//! by default) carved into consecutive `/30`s. Block `n` covers
//! `base + 4n .. base + 4n + 3`; its two usable addresses go to the `from`
//! and `to` side of the link respectively. The allocator never wraps: once
//! the block is used up every further request fails.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::net::Ipv4Addr;

/// Prefix length of a single point-to-point link.
pub const LINK_PREFIX_LEN: u8 = 30;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("point-to-point address space {block} is exhausted after {capacity} links")]
    Exhausted { block: Ipv4Net, capacity: u32 },
    #[error("point-to-point block {0} is smaller than a /30")]
    BlockTooSmall(Ipv4Net),
}

/// One allocated `/30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkBlock {
    /// 0-based allocation order.
    pub index: u32,
    pub network: Ipv4Net,
    /// Address for the `from` side.
    pub a: Ipv4Addr,
    /// Address for the `to` side.
    pub b: Ipv4Addr,
}

/// Sequential `/30` allocator over a reserved block.
#[derive(Debug)]
pub struct LinkAllocator {
    block: Ipv4Net,
    capacity: u32,
    next: u32,
}

impl LinkAllocator {
    pub fn new(block: Ipv4Net) -> Result<Self, AllocationError> {
        let block = block.trunc();
        if block.prefix_len() > LINK_PREFIX_LEN {
            return Err(AllocationError::BlockTooSmall(block));
        }
        let capacity = 1u32 << (LINK_PREFIX_LEN - block.prefix_len());
        Ok(Self {
            block,
            capacity,
            next: 0,
        })
    }

    /// Number of links the block can hold.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of links handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }

    pub fn allocate(&mut self) -> Result<LinkBlock, AllocationError> {
        if self.next >= self.capacity {
            return Err(AllocationError::Exhausted {
                block: self.block,
                capacity: self.capacity,
            });
        }

        let index = self.next;
        let base = u32::from(self.block.network()) + index * 4;
        let network = Ipv4Net::new(Ipv4Addr::from(base), LINK_PREFIX_LEN)
            .map_err(|_| AllocationError::BlockTooSmall(self.block))?;
        self.next += 1;

        log::debug!("Allocated point-to-point block {} (#{})", network, index);
        Ok(LinkBlock {
            index,
            network,
            a: Ipv4Addr::from(base + 1),
            b: Ipv4Addr::from(base + 2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_block() -> Ipv4Net {
        "10.255.0.0/24".parse().unwrap()
    }

    #[test]
    fn test_first_blocks_are_sequential() {
        let mut allocator = LinkAllocator::new(default_block()).unwrap();
        let first = allocator.allocate().unwrap();
        let second = allocator.allocate().unwrap();

        assert_eq!(first.network.to_string(), "10.255.0.0/30");
        assert_eq!(first.a.to_string(), "10.255.0.1");
        assert_eq!(first.b.to_string(), "10.255.0.2");
        assert_eq!(second.network.to_string(), "10.255.0.4/30");
        assert_eq!(second.a.to_string(), "10.255.0.5");
        assert_eq!(second.b.to_string(), "10.255.0.6");
        assert_eq!(second.index, 1);
    }

    #[test]
    fn test_exhaustion_is_explicit() {
        let mut allocator = LinkAllocator::new(default_block()).unwrap();
        assert_eq!(allocator.capacity(), 64);
        for _ in 0..64 {
            allocator.allocate().unwrap();
        }
        let err = allocator.allocate().unwrap_err();
        assert!(matches!(err, AllocationError::Exhausted { capacity: 64, .. }));
        // Still exhausted; no wrap-around.
        assert!(allocator.allocate().is_err());
    }

    #[test]
    fn test_blocks_never_overlap() {
        let mut allocator = LinkAllocator::new("172.31.0.0/26".parse().unwrap()).unwrap();
        let blocks: Vec<LinkBlock> = (0..16).map(|_| allocator.allocate().unwrap()).collect();
        for (i, x) in blocks.iter().enumerate() {
            for y in &blocks[i + 1..] {
                assert!(!x.network.contains(&y.network.network()));
                assert!(u32::from(y.network.network()) > u32::from(x.network.network()));
            }
        }
    }

    #[test]
    fn test_block_smaller_than_link_is_rejected() {
        assert!(LinkAllocator::new("10.0.0.0/31".parse().unwrap()).is_err());
    }
}
