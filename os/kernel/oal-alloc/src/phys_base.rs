//! # Physical Base Resolution
//!
//! A reserved region is described by the address the platform firmware sees.
//! Depending on the OS, the address the pool manager hands out for page 0 of
//! that region can differ (typed memory objects, bus aliases of an SRAM
//! seen from another core, ...). The [`PhysBaseResolver`] chosen when the
//! [`PageManager`](crate::PageManager) is built performs that translation once,
//! when the chunk is created.

use crate::error::{OalError, Result};
use crate::region::RegionDescriptor;
use oal_memory_addresses::PhysicalAddress;

/// Maps a region descriptor to the base address allocations are computed from.
pub trait PhysBaseResolver {
    /// # Errors
    /// Whatever makes the region unusable on this OS, typically
    /// [`OalError::InvalidRegion`].
    fn resolve(&self, region: &RegionDescriptor) -> Result<PhysicalAddress>;
}

/// The region's own physical address (Linux, standalone).
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityBase;

impl PhysBaseResolver for IdentityBase {
    fn resolve(&self, region: &RegionDescriptor) -> Result<PhysicalAddress> {
        Ok(region.phys_addr())
    }
}

/// The region as seen through a fixed bus offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct OffsetBase {
    offset: i64,
}

impl OffsetBase {
    #[must_use]
    pub const fn new(offset: i64) -> Self {
        Self { offset }
    }
}

impl PhysBaseResolver for OffsetBase {
    fn resolve(&self, region: &RegionDescriptor) -> Result<PhysicalAddress> {
        let base = region
            .phys_addr()
            .as_u64()
            .checked_add_signed(self.offset)
            .ok_or(OalError::InvalidRegion)?;
        base.checked_add(region.size())
            .map(|_| PhysicalAddress::new(base))
            .ok_or(OalError::InvalidRegion)
    }
}

impl<R: PhysBaseResolver + ?Sized> PhysBaseResolver for &R {
    fn resolve(&self, region: &RegionDescriptor) -> Result<PhysicalAddress> {
        (**self).resolve(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sram() -> RegionDescriptor {
        RegionDescriptor::new("sram", PhysicalAddress::new(0x2000_0000), 0x1000, 3)
    }

    #[test]
    fn identity_keeps_the_address() {
        assert_eq!(IdentityBase.resolve(&sram()), Ok(PhysicalAddress::new(0x2000_0000)));
    }

    #[test]
    fn offset_applies_in_both_directions() {
        assert_eq!(
            OffsetBase::new(0x1000_0000).resolve(&sram()),
            Ok(PhysicalAddress::new(0x3000_0000))
        );
        assert_eq!(
            OffsetBase::new(-0x2000_0000).resolve(&sram()),
            Ok(PhysicalAddress::zero())
        );
        assert_eq!(
            OffsetBase::new(-0x2000_0001).resolve(&sram()),
            Err(OalError::InvalidRegion)
        );
    }
}
