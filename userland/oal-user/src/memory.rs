//! # Process memory API
//!
//! [`Memory`] is what applications use. It allocates through the driver,
//! keeps one record per allocation and hands out a [`MemoryHandle`] for it.
//! Virtual views are created on first use and cached on the record: one
//! cacheable and one non-cacheable view at most.
//!
//! Handles are generational, so a handle kept past [`Memory::free_memory`]
//! is rejected even after its slot has been reused.

use crate::client::DriverClient;
use crate::vmem::VirtMemManager;
use alloc::vec;
use alloc::vec::Vec;
use log::{debug, error};
use oal_abi::{AllocFlags, MemoryAccess, Transport};
use oal_alloc::{
    CachePolicy, Limits, MappedAddress, OalError, PhysMapper, Result, SlotPool, Token,
    TokenMappings,
};
use oal_memory_addresses::{PhysicalAddress, VirtualAddress};
use oal_sync::SpinLock;

/// Names one allocation of a [`Memory`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle {
    slot: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct PhysicalPageMapping {
    phys: PhysicalAddress,
    size: u64,
    cacheable: Option<VirtualAddress>,
    non_cacheable: Option<VirtualAddress>,
}

impl PhysicalPageMapping {
    const fn view(&self, policy: CachePolicy) -> Option<VirtualAddress> {
        match policy {
            CachePolicy::Cacheable => self.cacheable,
            CachePolicy::NonCacheable => self.non_cacheable,
        }
    }

    const fn view_mut(&mut self, policy: CachePolicy) -> &mut Option<VirtualAddress> {
        match policy {
            CachePolicy::Cacheable => &mut self.cacheable,
            CachePolicy::NonCacheable => &mut self.non_cacheable,
        }
    }
}

struct Allocations {
    slots: SlotPool<PhysicalPageMapping>,
    generations: Vec<u32>,
}

impl Allocations {
    fn new(capacity: usize) -> Self {
        Self {
            slots: SlotPool::new(capacity),
            generations: vec![0; capacity],
        }
    }

    fn insert(&mut self, mapping: PhysicalPageMapping) -> Result<MemoryHandle> {
        let slot = self.slots.insert(mapping)?;
        let generation = &mut self.generations[slot];
        *generation = generation.wrapping_add(1).max(1);
        Ok(MemoryHandle {
            slot: u32::try_from(slot).map_err(|_| OalError::PoolFull)?,
            generation: *generation,
        })
    }

    fn index(&self, handle: MemoryHandle) -> Result<usize> {
        let slot = handle.slot as usize;
        match self.generations.get(slot) {
            Some(&g) if g == handle.generation && self.slots.get(slot).is_some() => Ok(slot),
            _ => Err(OalError::InvalidArgument),
        }
    }

    fn get(&self, handle: MemoryHandle) -> Result<&PhysicalPageMapping> {
        let slot = self.index(handle)?;
        self.slots.get(slot).ok_or(OalError::InvalidArgument)
    }

    fn get_mut(&mut self, handle: MemoryHandle) -> Result<&mut PhysicalPageMapping> {
        let slot = self.index(handle)?;
        self.slots.get_mut(slot).ok_or(OalError::InvalidArgument)
    }

    fn remove(&mut self, handle: MemoryHandle) -> Result<PhysicalPageMapping> {
        let slot = self.index(handle)?;
        self.slots.remove(slot)
    }
}

/// Process-side memory manager.
///
/// `M` is cloned once so that allocations and shared tokens each own a
/// mapper; pass a reference or another cheap handle.
pub struct Memory<T: Transport, M: PhysMapper + Clone> {
    driver: DriverClient<T>,
    views: VirtMemManager<M>,
    tokens: TokenMappings<M>,
    allocations: SpinLock<Allocations>,
}

impl<T: Transport, M: PhysMapper + Clone> Memory<T, M> {
    #[must_use]
    pub fn new(transport: T, mapper: M) -> Self {
        Self::with_limits(transport, mapper, Limits::default())
    }

    #[must_use]
    pub fn with_limits(transport: T, mapper: M, limits: Limits) -> Self {
        let capacity = limits.max_allocations();
        Self {
            driver: DriverClient::new(transport),
            views: VirtMemManager::new(mapper.clone(), capacity.saturating_mul(2)),
            tokens: TokenMappings::new(mapper, limits.max_mapped_tokens()),
            allocations: SpinLock::new(Allocations::new(capacity)),
        }
    }

    #[inline]
    #[must_use]
    pub const fn driver(&self) -> &DriverClient<T> {
        &self.driver
    }

    #[inline]
    #[must_use]
    pub const fn views(&self) -> &VirtMemManager<M> {
        &self.views
    }

    /// Allocate `size` bytes; the chunk id travels in `flags`.
    ///
    /// # Errors
    /// - The driver's allocation failure.
    /// - [`OalError::PoolFull`] if this process already tracks the maximum
    ///   number of allocations; the pages are returned to the driver then.
    pub fn alloc_memory(&self, size: u64, flags: AllocFlags) -> Result<MemoryHandle> {
        let allocation = self.driver.alloc(size, flags)?;
        let inserted = self.allocations.with_lock(|a| {
            a.insert(PhysicalPageMapping {
                phys: allocation.phys,
                size: allocation.size,
                cacheable: None,
                non_cacheable: None,
            })
        });
        match inserted {
            Ok(handle) => {
                debug!("{handle:?}: {:#x} bytes at {}", allocation.size, allocation.phys);
                Ok(handle)
            }
            Err(e) => {
                error!("No room to track the allocation at {}", allocation.phys);
                self.driver.free(allocation.phys, allocation.size)?;
                Err(e)
            }
        }
    }

    /// [`Memory::alloc_memory`] followed by [`Memory::return_address`].
    ///
    /// # Errors
    /// Either step's failure; nothing stays allocated then.
    pub fn alloc_and_map_memory(
        &self,
        size: u64,
        flags: AllocFlags,
        access: MemoryAccess,
    ) -> Result<(MemoryHandle, MappedAddress)> {
        let handle = self.alloc_memory(size, flags)?;
        match self.return_address(handle, access) {
            Ok(address) => Ok((handle, address)),
            Err(e) => {
                self.free_memory(handle)?;
                Err(e)
            }
        }
    }

    /// Address of `handle`'s memory under `access`.
    ///
    /// The view is mapped on first request and reused afterwards.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle, mapping failures.
    pub fn return_address(
        &self,
        handle: MemoryHandle,
        access: MemoryAccess,
    ) -> Result<MappedAddress> {
        let mapping = self.allocations.with_lock(|a| a.get(handle).copied())?;
        if !access.needs_mapping() {
            return Ok(MappedAddress::Physical(mapping.phys));
        }

        let policy = CachePolicy::from(access);
        if let Some(va) = mapping.view(policy) {
            return Ok(MappedAddress::Virtual(va));
        }

        let va = self.views.map(mapping.phys, mapping.size, policy)?;
        let existing = self.allocations.with_lock(|a| {
            let slot = a.get_mut(handle)?.view_mut(policy);
            let existing = *slot;
            slot.get_or_insert(va);
            Ok::<_, OalError>(existing)
        });
        match existing {
            Ok(None) => Ok(MappedAddress::Virtual(va)),
            // Another caller stored the view first; drop the extra reference.
            Ok(Some(current)) => {
                self.views.unmap(va)?;
                Ok(MappedAddress::Virtual(current))
            }
            Err(e) => {
                self.views.unmap(va)?;
                Err(e)
            }
        }
    }

    /// Drop every view of `handle`; the memory stays allocated.
    ///
    /// A view the mapper fails to remove stays cached on the handle, so the
    /// call can be repeated.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle, otherwise the first
    /// unmap failure.
    pub fn unmap_memory(&self, handle: MemoryHandle) -> Result<()> {
        let views = self.allocations.with_lock(|a| {
            let mapping = a.get_mut(handle)?;
            Ok::<_, OalError>([
                (CachePolicy::Cacheable, mapping.cacheable.take()),
                (CachePolicy::NonCacheable, mapping.non_cacheable.take()),
            ])
        })?;

        let mut result = Ok(());
        for (policy, va) in views {
            let Some(va) = va else { continue };
            if let Err(e) = self.views.unmap(va) {
                self.allocations.with_lock(|a| {
                    if let Ok(mapping) = a.get_mut(handle) {
                        mapping.view_mut(policy).get_or_insert(va);
                    }
                });
                result = result.and(Err(e));
            }
        }
        result
    }

    /// Unmap and return `handle`'s memory to the driver.
    ///
    /// The pages go back to the driver even if a view cannot be unmapped.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle, otherwise the first
    /// mapper or driver failure.
    pub fn free_memory(&self, handle: MemoryHandle) -> Result<()> {
        let mapping = self.allocations.with_lock(|a| a.remove(handle))?;
        let mut result = Ok(());
        for va in [mapping.cacheable, mapping.non_cacheable]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.views.unmap(va) {
                error!("{handle:?}: view at {va} is left mapped");
                result = result.and(Err(e));
            }
        }
        result.and(self.driver.free(mapping.phys, mapping.size))
    }

    /// Share `handle`'s memory with other processes.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle, then the driver's
    /// failure (e.g. [`OalError::Overlap`]).
    pub fn create_memory_token(&self, handle: MemoryHandle) -> Result<Token> {
        let mapping = self.allocations.with_lock(|a| a.get(handle).copied())?;
        self.driver.create_token(mapping.phys, mapping.size)
    }

    /// # Errors
    /// See [`TokenMappings::map_token`].
    pub fn map_memory_token(&self, token: Token, access: MemoryAccess) -> Result<MappedAddress> {
        self.tokens.map_token(&self.driver, token, access)
    }

    /// # Errors
    /// See [`TokenMappings::unmap_token`].
    pub fn unmap_memory_token(&self, token: Token) -> Result<()> {
        self.tokens.unmap_token(token)
    }

    /// Release `token`, unmapping it here first if needed.
    ///
    /// # Errors
    /// See [`TokenMappings::release_token`].
    pub fn release_token(&self, token: Token) -> Result<()> {
        self.tokens.release_token(&self.driver, token)
    }
}
