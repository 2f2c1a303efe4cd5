use crate::error::{Error, Result};

/// Largest value either partition dimension may take. Each dimension maps to
/// one octet of the address.
pub const MAX_DIMENSION: u16 = 256;

/// The constants that fully determine an allocation plan.
///
/// Addresses are laid out as `base.coarse.fine.0`:
///
/// - `base_octet` is fixed for the whole plan.
/// - The coarse index walks the second octet over `[0, coarse_size)`.
/// - The fine index walks the third octet over `[0, fine_size)` in steps of
///   `stride`, so each coarse step yields `fine_size / stride` subnets.
///
/// The reference layout carves `10.0.0.0/8` into `/21` blocks:
/// `256 * (256 / 8) = 8192` subnets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartitionLayout {
    base_octet: u8,
    coarse_size: u16,
    fine_size: u16,
    stride: u16,
}

impl PartitionLayout {
    /// 8192 `/21` subnets of `10.0.0.0/8`, split 4096/4096 between the two
    /// routing domains.
    pub const REFERENCE: Self = Self {
        base_octet: 10,
        coarse_size: 256,
        fine_size: 256,
        stride: 8,
    };

    /// Creates a layout, rejecting any combination that cannot be expressed
    /// as IPv4 octets or that would produce an empty plan.
    ///
    /// A `stride` that does not divide `fine_size` is accepted: the plan is
    /// still capped at `coarse_size * (fine_size / stride)` records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`] if a dimension is 0 or larger than
    /// [`MAX_DIMENSION`], if `stride` is 0, or if the plan would be empty.
    pub fn new(base_octet: u8, coarse_size: u16, fine_size: u16, stride: u16) -> Result<Self> {
        if coarse_size == 0 || coarse_size > MAX_DIMENSION {
            return Err(Error::InvalidLayout {
                reason: format!("coarse size {coarse_size} must be in 1..={MAX_DIMENSION}"),
            });
        }
        if fine_size == 0 || fine_size > MAX_DIMENSION {
            return Err(Error::InvalidLayout {
                reason: format!("fine size {fine_size} must be in 1..={MAX_DIMENSION}"),
            });
        }
        if stride == 0 {
            return Err(Error::InvalidLayout {
                reason: "stride must be greater than 0".to_string(),
            });
        }
        if stride > fine_size {
            return Err(Error::InvalidLayout {
                reason: format!("stride {stride} exceeds fine size {fine_size}; plan would be empty"),
            });
        }

        Ok(Self {
            base_octet,
            coarse_size,
            fine_size,
            stride,
        })
    }

    pub const fn base_octet(&self) -> u8 {
        self.base_octet
    }

    pub const fn coarse_size(&self) -> u16 {
        self.coarse_size
    }

    pub const fn fine_size(&self) -> u16 {
        self.fine_size
    }

    pub const fn stride(&self) -> u16 {
        self.stride
    }

    /// Number of subnets emitted per coarse step.
    pub const fn blocks_per_coarse_step(&self) -> usize {
        (self.fine_size / self.stride) as usize
    }

    /// Number of records in the plan, `coarse_size * (fine_size / stride)`.
    pub const fn total_blocks(&self) -> usize {
        self.coarse_size as usize * self.blocks_per_coarse_step()
    }

    /// Number of leading records assigned to [`RoutingDomain::A`].
    ///
    /// [`RoutingDomain::A`]: crate::RoutingDomain::A
    pub const fn split_point(&self) -> usize {
        self.total_blocks() / 2
    }

    /// Prefix length of each subnet, or `None` when `stride` is not a power
    /// of two (the blocks are then not CIDR-aligned).
    pub const fn prefix_len(&self) -> Option<u8> {
        if self.stride.is_power_of_two() {
            Some(24 - self.stride.trailing_zeros() as u8)
        } else {
            None
        }
    }
}

impl Default for PartitionLayout {
    fn default() -> Self {
        Self::REFERENCE
    }
}
