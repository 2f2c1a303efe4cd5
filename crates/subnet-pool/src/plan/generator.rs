use core::iter::FusedIterator;
use std::net::Ipv4Addr;

use crate::{
    plan::PartitionLayout,
    record::{AllocationRecord, RoutingDomain},
};

/// Lazily emits the allocation plan for a [`PartitionLayout`].
///
/// Records come out coarse-index-major: `base.0.0.0`, `base.0.S.0`, ...,
/// `base.1.0.0`, and so on. A running counter caps the output at
/// [`PartitionLayout::total_blocks`], independent of the loop bounds. When the
/// stride does not divide the fine dimension the nested walk has more pairs
/// than that, and the counter is what stops it.
///
/// The generator is deterministic: two generators over the same layout yield
/// identical sequences.
#[derive(Clone, Debug)]
pub struct PlanGenerator {
    layout: PartitionLayout,
    coarse: u16,
    fine: u16,
    emitted: usize,
    total: usize,
    split: usize,
}

impl PlanGenerator {
    pub const fn new(layout: PartitionLayout) -> Self {
        Self {
            layout,
            coarse: 0,
            fine: 0,
            emitted: 0,
            total: layout.total_blocks(),
            split: layout.split_point(),
        }
    }

    pub const fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// Routing domain for the `n`th record, counting from 1.
    const fn domain_for(&self, n: usize) -> RoutingDomain {
        if n <= self.split {
            RoutingDomain::A
        } else {
            RoutingDomain::B
        }
    }
}

impl Iterator for PlanGenerator {
    type Item = AllocationRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.emitted >= self.total {
            return None;
        }

        if self.fine >= self.layout.fine_size() {
            self.coarse += 1;
            self.fine = 0;
        }
        if self.coarse >= self.layout.coarse_size() {
            return None;
        }

        // Both indices are below `MAX_DIMENSION` here, so they fit an octet.
        let cidr_block = Ipv4Addr::new(
            self.layout.base_octet(),
            self.coarse as u8,
            self.fine as u8,
            0,
        );
        self.emitted += 1;
        self.fine += self.layout.stride();

        Some(AllocationRecord::new(
            cidr_block,
            self.domain_for(self.emitted),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.emitted;
        (remaining, Some(remaining))
    }
}

// The nested walk always has at least `total` pairs: each coarse step yields
// `ceil(fine / stride) >= fine / stride` of them.
impl ExactSizeIterator for PlanGenerator {}

impl FusedIterator for PlanGenerator {}

/// Produces the complete, ordered allocation plan for `layout`.
///
/// # Example
/// ```
/// use subnet_pool::{PartitionLayout, generate_plan};
///
/// let plan = generate_plan(&PartitionLayout::REFERENCE);
/// assert_eq!(plan.len(), 8192);
/// assert_eq!(plan[1].cidr_block.to_string(), "10.0.8.0");
/// assert_eq!(plan[32].cidr_block.to_string(), "10.1.0.0");
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(total = layout.total_blocks())))]
pub fn generate_plan(layout: &PartitionLayout) -> Vec<AllocationRecord> {
    PlanGenerator::new(*layout).collect()
}
