//! Descriptors of statically reserved memory regions.

use crate::error::{OalError, Result};
use crate::limits::Limits;
use log::error;
use oal_abi::RegionName;
use oal_accessors_derive::Accessors;
use oal_memory_addresses::PhysicalAddress;

/// One reserved DRAM/SRAM region as described by the platform.
///
/// Immutable once a chunk has been created from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Accessors)]
pub struct RegionDescriptor {
    name: RegionName,
    phys_addr: PhysicalAddress,
    size: u64,
    start_id: u32,
    align: u64,
    init: bool,
    autobalance: bool,
}

impl RegionDescriptor {
    /// A region without zero-initialization or autobalancing; refine it with
    /// the `with_*` builders.
    #[must_use]
    pub fn new(name: &str, phys_addr: PhysicalAddress, size: u64, start_id: u32) -> Self {
        Self {
            name: RegionName::new(name),
            phys_addr,
            size,
            start_id,
            align: 1,
            init: false,
            autobalance: false,
        }
    }

    /// Last byte of the region, inclusive.
    #[must_use]
    pub const fn end(&self) -> Option<PhysicalAddress> {
        match self.size.checked_sub(1) {
            Some(last) => self.phys_addr.checked_add(last),
            None => None,
        }
    }

    /// Check the descriptor against the table limits.
    ///
    /// # Errors
    /// [`OalError::InvalidRegion`] for a zero size or alignment, a size above
    /// the limit, an id above the limit or a range that wraps the address
    /// space.
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        let name = self.name;
        if self.size == 0 || self.size > limits.max_region_size() {
            error!("Region {name}: unsupported size {:#x}", self.size);
            return Err(OalError::InvalidRegion);
        }
        if self.align == 0 {
            error!("Region {name}: alignment must be non-zero");
            return Err(OalError::InvalidRegion);
        }
        if self.start_id > limits.max_reserved_id() {
            error!(
                "Region {name}: id {} above the maximum {}",
                self.start_id,
                limits.max_reserved_id()
            );
            return Err(OalError::InvalidRegion);
        }
        if self.end().is_none() {
            error!("Region {name}: range wraps the physical address space");
            return Err(OalError::InvalidRegion);
        }
        Ok(())
    }
}
