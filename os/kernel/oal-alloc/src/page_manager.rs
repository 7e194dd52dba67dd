//! # Page Manager
//!
//! Owns one [`MemoryChunk`] per registered region and routes page requests to
//! them, either by region id or by physical address.
//!
//! ```text
//!   Uninitialized ──init_memory_pools──► Active ──reset_memory_pools──► Uninitialized
//!                                         │  ▲
//!                                         └──┘ add_memory_pool / init_memory_pools(force)
//! ```

use crate::chunk::MemoryChunk;
use crate::error::{OalError, Result};
use crate::limits::{AUTOBALANCE_CHUNK_ID, Limits};
use crate::phys_base::{IdentityBase, PhysBaseResolver};
use crate::region::RegionDescriptor;
use alloc::vec::Vec;
use log::{error, info};
use oal_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// Position of a chunk in the manager's table.
///
/// Every chunk the manager creates gets a fresh serial number, and the handle
/// carries it. A handle kept across [`PageManager::reset_memory_pools`] or a
/// forced re-initialization no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    index: usize,
    serial: u32,
}

impl ChunkHandle {
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

/// Pages handed out by [`PageManager::get_free_pages_from_chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub chunk: ChunkHandle,
    pub start: usize,
    pub count: usize,
}

pub struct PageManager<S: PageSize = Size4K, R: PhysBaseResolver = IdentityBase> {
    limits: Limits,
    resolver: R,
    regions: Vec<RegionDescriptor>,
    chunks: Vec<MemoryChunk<S>>,
    serials: Vec<u32>,
    last_serial: u32,
    initialized: bool,
}

impl PageManager {
    /// 4 KiB pages, identity base resolution and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolver(Limits::default(), IdentityBase)
    }
}

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PageSize, R: PhysBaseResolver> PageManager<S, R> {
    #[must_use]
    pub fn with_resolver(limits: Limits, resolver: R) -> Self {
        Self {
            limits,
            resolver,
            regions: Vec::with_capacity(limits.max_regions()),
            chunks: Vec::with_capacity(limits.max_regions()),
            serials: Vec::with_capacity(limits.max_regions()),
            last_serial: 0,
            initialized: false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Build the chunk set from the registered regions, all pages free.
    ///
    /// Does nothing if already initialized, unless `force` is set.
    ///
    /// # Errors
    /// Resolver failures. The previous chunk set is kept in that case.
    pub fn init_memory_pools(&mut self, force: bool) -> Result<()> {
        if self.initialized && !force {
            return Ok(());
        }

        let mut chunks = Vec::with_capacity(self.limits.max_regions());
        for region in &self.regions {
            chunks.push(self.make_chunk(*region)?);
        }
        let serials = (0..chunks.len()).map(|_| self.next_serial()).collect();
        self.serials = serials;
        self.chunks = chunks;
        self.initialized = true;
        Ok(())
    }

    /// Drop every chunk and region.
    pub fn reset_memory_pools(&mut self) {
        self.chunks.clear();
        self.serials.clear();
        self.regions.clear();
        self.initialized = false;
    }

    /// Register `region` and create its chunk.
    ///
    /// # Errors
    /// - [`OalError::TooManyRegions`] if the table is full.
    /// - [`OalError::InvalidRegion`] for a malformed descriptor or an id that
    ///   is already registered.
    pub fn add_memory_pool(&mut self, region: RegionDescriptor) -> Result<ChunkHandle> {
        if !self.initialized {
            self.init_memory_pools(false)?;
        }
        if self.chunks.len() >= self.limits.max_regions() {
            error!(
                "Cannot manage region {}: all {} slots in use",
                region.name(),
                self.limits.max_regions()
            );
            return Err(OalError::TooManyRegions);
        }
        region.validate(&self.limits)?;
        if self.find(region.start_id()).is_some() {
            error!("Region id {} is already managed", region.start_id());
            return Err(OalError::InvalidRegion);
        }

        let chunk = self.make_chunk(region)?;
        info!(
            "Managing the chunk [{} - {:#x}] (align {:#x}, id {}, autobalance {}, init {}) as {}",
            chunk.base(),
            chunk.base().as_u64() + chunk.managed_size() - 1,
            region.align(),
            region.start_id(),
            region.autobalance(),
            region.init(),
            region.name()
        );

        let serial = self.next_serial();
        self.regions.push(region);
        self.chunks.push(chunk);
        self.serials.push(serial);
        Ok(ChunkHandle {
            index: self.chunks.len() - 1,
            serial,
        })
    }

    /// Unregister `handle`'s chunk and its region.
    ///
    /// Handles of chunks registered after it stop resolving.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle.
    pub fn remove_memory_pool(&mut self, handle: ChunkHandle) -> Result<RegionDescriptor> {
        let index = self.slot(handle)?;
        self.chunks.remove(index);
        self.serials.remove(index);
        let region = self.regions.remove(index);
        info!("Region {} is no longer managed", region.name());
        Ok(region)
    }

    /// Take every page of `handle`'s chunk so nothing can be allocated there.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle or a chunk with pages
    /// in use.
    pub fn reserve_chunk(&mut self, handle: ChunkHandle) -> Result<()> {
        let index = self.slot(handle)?;
        self.chunks[index].reserve_all()
    }

    /// Make every page of `handle`'s chunk free again.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle.
    pub fn release_chunk(&mut self, handle: ChunkHandle) -> Result<()> {
        let index = self.slot(handle)?;
        self.chunks[index].reset();
        Ok(())
    }

    fn next_serial(&mut self) -> u32 {
        self.last_serial = self.last_serial.wrapping_add(1).max(1);
        self.last_serial
    }

    fn handle(&self, index: usize) -> ChunkHandle {
        ChunkHandle {
            index,
            serial: self.serials[index],
        }
    }

    fn slot(&self, handle: ChunkHandle) -> Result<usize> {
        match self.serials.get(handle.index) {
            Some(&serial) if serial == handle.serial => Ok(handle.index),
            _ => Err(OalError::InvalidArgument),
        }
    }

    /// Base address `region` would be managed at.
    ///
    /// # Errors
    /// Resolver failures.
    pub fn resolve_base(&self, region: &RegionDescriptor) -> Result<PhysicalAddress> {
        self.resolver.resolve(region)
    }

    fn make_chunk(&self, region: RegionDescriptor) -> Result<MemoryChunk<S>> {
        let base = self.resolve_base(&region)?;
        MemoryChunk::new(region, base)
    }

    fn find(&self, chunk_id: u32) -> Option<ChunkHandle> {
        self.chunks
            .iter()
            .position(|c| c.start_id() == chunk_id)
            .map(|i| self.handle(i))
    }

    /// Chunk registered under `chunk_id`.
    ///
    /// [`AUTOBALANCE_CHUNK_ID`] selects the autobalanced chunk with the most
    /// free space.
    ///
    /// # Errors
    /// [`OalError::NotFound`] if no such chunk exists.
    pub fn get_memory_pool(&self, chunk_id: u32) -> Result<ChunkHandle> {
        if chunk_id == AUTOBALANCE_CHUNK_ID {
            return self
                .chunks
                .iter()
                .enumerate()
                .filter(|(_, c)| c.region().autobalance())
                .max_by_key(|(_, c)| c.free_space())
                .map(|(i, _)| self.handle(i))
                .ok_or(OalError::NotFound);
        }
        self.find(chunk_id).ok_or(OalError::NotFound)
    }

    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale or foreign handle.
    pub fn chunk(&self, handle: ChunkHandle) -> Result<&MemoryChunk<S>> {
        self.chunks
            .get(self.slot(handle)?)
            .ok_or(OalError::InvalidArgument)
    }

    /// Chunk whose managed range contains `[pa, pa + size)`.
    ///
    /// # Errors
    /// [`OalError::NotFound`] if the range is outside every chunk.
    pub fn get_memory_chunk_based_on_addr(
        &self,
        pa: PhysicalAddress,
        size: u64,
    ) -> Result<ChunkHandle> {
        self.chunks
            .iter()
            .position(|c| c.contains(pa, size))
            .map(|i| self.handle(i))
            .ok_or(OalError::NotFound)
    }

    /// Allocate pages for `size` bytes from the chunk registered as `chunk_id`.
    ///
    /// # Errors
    /// - [`OalError::InvalidArgument`] for a zero size.
    /// - [`OalError::NotFound`] for an unknown id.
    /// - [`OalError::OutOfMemory`] if no run of free pages is long enough.
    pub fn get_free_pages_from_chunk(&mut self, chunk_id: u32, size: u64) -> Result<PageRange> {
        if size == 0 {
            return Err(OalError::InvalidArgument);
        }
        let handle = self.get_memory_pool(chunk_id)?;
        let chunk = &mut self.chunks[handle.index];
        let (start, count) = chunk.alloc_pages(size).inspect_err(|e| {
            error!("Chunk {chunk_id}: cannot allocate {size:#x} bytes: {e}");
        })?;
        Ok(PageRange {
            chunk: handle,
            start,
            count,
        })
    }

    /// Return `count` pages starting at `start` to `handle`'s chunk.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for an unknown handle or a range past
    /// the chunk; [`OalError::DoubleFree`] if any page was not allocated.
    pub fn set_free_pages(
        &mut self,
        handle: ChunkHandle,
        start: usize,
        count: usize,
    ) -> Result<()> {
        let index = self.slot(handle)?;
        let chunk = &mut self.chunks[index];
        chunk.free_pages(start, count).inspect_err(|e| {
            error!(
                "Chunk {}: cannot release {count} pages at {start}: {e}",
                chunk.start_id()
            );
        })
    }

    /// Physical address of page `start` of `range`.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a stale handle.
    pub fn range_address(&self, range: &PageRange) -> Result<PhysicalAddress> {
        Ok(self.chunk(range.chunk)?.page_address(range.start))
    }

    /// # Errors
    /// [`OalError::NotFound`] for an unknown id.
    pub fn get_chunk_base_address(&self, chunk_id: u32) -> Result<PhysicalAddress> {
        Ok(self.chunk(self.get_memory_pool(chunk_id)?)?.base())
    }

    /// Managed size of a chunk in bytes.
    ///
    /// # Errors
    /// [`OalError::NotFound`] for an unknown id.
    pub fn get_chunk_size(&self, chunk_id: u32) -> Result<u64> {
        Ok(self.chunk(self.get_memory_pool(chunk_id)?)?.managed_size())
    }

    /// # Errors
    /// [`OalError::NotFound`] for an unknown id.
    pub fn is_chunk_autobalanced(&self, chunk_id: u32) -> Result<bool> {
        Ok(self.chunk(self.get_memory_pool(chunk_id)?)?.region().autobalance())
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &MemoryChunk<S>> {
        self.chunks.iter()
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(MemoryChunk::managed_size).sum()
    }

    #[must_use]
    pub fn free_size(&self) -> u64 {
        self.chunks.iter().map(MemoryChunk::free_space).sum()
    }

    /// Allocations with pages still in use, over every chunk.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.chunks.iter().map(MemoryChunk::allocation_count).sum()
    }

    /// Bit `id` set for every registered chunk id.
    #[must_use]
    pub fn devices_mask(&self) -> u64 {
        self.chunks
            .iter()
            .fold(0, |mask, c| mask | (1 << c.start_id()))
    }

    /// Bit `id` set for every autobalanced chunk id.
    #[must_use]
    pub fn autobalance_mask(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.region().autobalance())
            .fold(0, |mask, c| mask | (1 << c.start_id()))
    }
}
