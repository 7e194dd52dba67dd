//! Memory-mapping collaborator.
//!
//! The pool manager never creates page tables itself. Whenever a physical
//! range has to become addressable (zeroing a region at registration, mapping
//! a shared token into a process) it asks a [`PhysMapper`].

use crate::error::{MapError, OalError, Result};
use log::error;
use oal_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Address space a mapping is created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapSpace {
    Kernel,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    Cacheable,
    NonCacheable,
}

impl From<oal_abi::MemoryAccess> for CachePolicy {
    fn from(access: oal_abi::MemoryAccess) -> Self {
        if access.is_cacheable() {
            Self::Cacheable
        } else {
            Self::NonCacheable
        }
    }
}

/// Creates and removes virtual views of physical ranges.
///
/// # Safety
/// A successful [`PhysMapper::map`] must return an address at which `len`
/// bytes are readable and writable until the matching [`PhysMapper::unmap`].
/// Region zero-initialization writes through that address.
pub unsafe trait PhysMapper {
    /// # Errors
    /// [`MapError`] if the range cannot be mapped.
    fn map(
        &self,
        pa: PhysicalAddress,
        len: u64,
        space: MapSpace,
        policy: CachePolicy,
    ) -> Result<VirtualAddress, MapError>;

    /// # Errors
    /// [`MapError::NotMapped`] if `va` is not a live mapping.
    fn unmap(&self, va: VirtualAddress, len: u64, space: MapSpace) -> Result<(), MapError>;
}

unsafe impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    fn map(
        &self,
        pa: PhysicalAddress,
        len: u64,
        space: MapSpace,
        policy: CachePolicy,
    ) -> Result<VirtualAddress, MapError> {
        (**self).map(pa, len, space, policy)
    }

    fn unmap(&self, va: VirtualAddress, len: u64, space: MapSpace) -> Result<(), MapError> {
        (**self).unmap(va, len, space)
    }
}

/// Zero `len` bytes at `pa` through a temporary non-cacheable kernel view.
///
/// Stores are 64 bits wide because some SRAMs reject narrower accesses; a
/// trailing remainder smaller than eight bytes is left untouched.
///
/// # Errors
/// [`OalError::Map`] if the view cannot be created or removed.
pub fn zero_physical<M: PhysMapper + ?Sized>(
    mapper: &M,
    pa: PhysicalAddress,
    len: u64,
) -> Result<()> {
    let words = usize::try_from(len / 8).map_err(|_| OalError::InvalidArgument)?;
    let va = mapper
        .map(pa, len, MapSpace::Kernel, CachePolicy::NonCacheable)
        .inspect_err(|e| error!("Failed to map {len:#x} bytes at {pa} for zeroing: {e}"))?;

    let base = va.as_mut_ptr::<u64>();
    for i in 0..words {
        // Safety: the mapper contract guarantees `len` writable bytes at `va`.
        unsafe { base.add(i).write_volatile(0) };
    }

    mapper.unmap(va, len, MapSpace::Kernel)?;
    Ok(())
}
