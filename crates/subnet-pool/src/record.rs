use core::fmt;
use std::net::Ipv4Addr;

/// Attribute name under which a record's network address is stored. This is
/// the table's partition key.
pub const CIDR_BLOCK_ATTRIBUTE: &str = "cidr_block";

/// Attribute name under which a record's routing domain is stored.
pub const ROUTING_DOMAIN_ATTRIBUTE: &str = "transit_gateway";

/// One of the two parallel routing backbones a subnet is pinned to.
///
/// Assignment depends only on allocation order: the first half of a plan
/// lands on [`RoutingDomain::A`], the rest on [`RoutingDomain::B`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoutingDomain {
    A,
    B,
}

impl RoutingDomain {
    /// The label written to the table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for RoutingDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row of the allocation table.
///
/// `cidr_block` is the network address of a fixed-size subnet (for example
/// `10.4.16.0`). It is unique across a plan and acts as the table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocationRecord {
    #[cfg_attr(feature = "serde", serde(rename = "cidr_block"))]
    pub cidr_block: Ipv4Addr,
    #[cfg_attr(feature = "serde", serde(rename = "transit_gateway"))]
    pub routing_domain: RoutingDomain,
}

impl AllocationRecord {
    pub const fn new(cidr_block: Ipv4Addr, routing_domain: RoutingDomain) -> Self {
        Self {
            cidr_block,
            routing_domain,
        }
    }
}

impl fmt::Display for AllocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.cidr_block, self.routing_domain)
    }
}
