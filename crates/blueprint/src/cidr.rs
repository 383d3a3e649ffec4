use std::{fmt, net::Ipv4Addr, str::FromStr};

use crate::{Error, Result, vars};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::InvalidCidr {
                cidr: format!("{addr}/{prefix}"),
                reason: "prefix length exceeds 32",
            });
        }
        let network = u32::from(addr);
        if network & !mask(prefix) != 0 {
            return Err(Error::InvalidCidr {
                cidr: format!("{addr}/{prefix}"),
                reason: "host bits are set",
            });
        }
        Ok(Self { network, prefix })
    }

    pub fn addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn last(&self) -> u32 {
        self.network | !mask(self.prefix)
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.network & mask(self.prefix) == self.network
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.network <= other.last() && other.network <= self.last()
    }

    /// The `index`-th block of length `prefix` inside this one.
    pub fn subnet(&self, prefix: u8, index: u32) -> Result<Self> {
        if prefix < self.prefix || prefix > 32 {
            return Err(Error::InvalidCidr {
                cidr: format!("{self} -> /{prefix}"),
                reason: "subnet prefix must be within the parent block",
            });
        }
        let bits = u32::from(prefix - self.prefix);
        if bits < 32 && index >= 1 << bits {
            return Err(Error::InvalidCidr {
                cidr: format!("{self} -> /{prefix}#{index}"),
                reason: "subnet index is outside the parent block",
            });
        }
        let size = if prefix == 0 { 0 } else { 1u32 << (32 - u32::from(prefix)) };
        Ok(Self {
            network: self.network + index * size,
            prefix,
        })
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidCidr {
            cidr: s.to_string(),
            reason,
        };
        let (addr, prefix) = s.split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| invalid("malformed address"))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| invalid("malformed prefix length"))?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix)
    }
}

/// Primary and secondary ranges of a cluster subnetwork.
///
/// The block is split so that pods get the first half, services the third quarter and
/// nodes the last quarter. The three ranges never overlap and all stay inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkRanges {
    pub block: Ipv4Cidr,
    pub nodes: Ipv4Cidr,
    pub pods: Ipv4Cidr,
    pub services: Ipv4Cidr,
}

impl NetworkRanges {
    pub fn carve(block: Ipv4Cidr) -> Result<Self> {
        if block.prefix() > 30 {
            return Err(Error::InvalidCidr {
                cidr: block.to_string(),
                reason: "block is too small to split into node, pod and service ranges",
            });
        }
        Ok(Self {
            block,
            pods: block.subnet(block.prefix() + 1, 0)?,
            services: block.subnet(block.prefix() + 2, 2)?,
            nodes: block.subnet(block.prefix() + 2, 3)?,
        })
    }

    pub fn cluster_default() -> Result<Self> {
        Self::carve(vars::CLUSTER_CIDR_BLOCK.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_ranges() {
        let ranges = NetworkRanges::cluster_default().unwrap();
        assert_eq!(ranges.pods.to_string(), "10.0.0.0/15");
        assert_eq!(ranges.services.to_string(), "10.2.0.0/16");
        assert_eq!(ranges.nodes.to_string(), "10.3.0.0/16");
    }

    #[rstest]
    #[case("10.0.0.0/14")]
    #[case("10.64.0.0/12")]
    #[case("192.168.0.0/16")]
    #[case("172.20.0.0/20")]
    #[case("100.64.0.0/30")]
    fn carved_ranges_are_disjoint_subsets(#[case] block: &str) {
        let ranges = NetworkRanges::carve(block.parse().unwrap()).unwrap();
        let parts = [ranges.nodes, ranges.pods, ranges.services];

        for (i, a) in parts.iter().enumerate() {
            assert!(ranges.block.contains(a), "{a} outside {block}");
            for b in &parts[i + 1..] {
                assert!(!a.overlaps(b), "{a} overlaps {b}");
            }
        }
    }

    #[rstest]
    #[case("10.0.0.0")]
    #[case("10.0.0.1/14")]
    #[case("10.0.0.0/33")]
    #[case("10.0.0/8")]
    fn rejects_malformed_blocks(#[case] block: &str) {
        assert!(block.parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn tiny_blocks_cannot_be_carved() {
        let block: Ipv4Cidr = "10.0.0.0/31".parse().unwrap();
        assert!(NetworkRanges::carve(block).is_err());
    }

    #[test]
    fn overlap_and_containment() {
        let a: Ipv4Cidr = "10.0.0.0/15".parse().unwrap();
        let b: Ipv4Cidr = "10.1.0.0/16".parse().unwrap();
        let c: Ipv4Cidr = "10.2.0.0/16".parse().unwrap();
        assert!(a.contains(&b));
        assert!(a.overlaps(&b) && b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!b.contains(&a));
    }
}
