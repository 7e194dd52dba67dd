//! The allocator context: one page manager and one token table, each behind
//! its own lock.

use crate::error::{OalError, Result};
use crate::limits::Limits;
use crate::mapper::{PhysMapper, zero_physical};
use crate::page_manager::{ChunkHandle, PageManager};
use crate::phys_base::{IdentityBase, PhysBaseResolver};
use crate::region::RegionDescriptor;
use crate::shared::TokenService;
use crate::token::{Token, TokenInfo, TokenTable};
use log::{debug, error, info};
use oal_memory_addresses::{
    PageSize, PhysicalAddress, Size4K, is_page_aligned, page_count, pages_to_bytes,
};
use oal_sync::SpinLock;

/// A successful page allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub phys: PhysicalAddress,
    /// Allocated bytes, a whole number of pages.
    pub size: u64,
    /// Alignment of the chunk the pages came from.
    pub align: u64,
    pub chunk_id: u32,
}

pub struct MemoryAllocator<S: PageSize = Size4K, R: PhysBaseResolver = IdentityBase> {
    pages: SpinLock<PageManager<S, R>>,
    tokens: SpinLock<TokenTable>,
}

impl MemoryAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolver(Limits::default(), IdentityBase)
    }
}

impl Default for MemoryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PageSize, R: PhysBaseResolver> MemoryAllocator<S, R> {
    #[must_use]
    pub fn with_resolver(limits: Limits, resolver: R) -> Self {
        Self {
            pages: SpinLock::new(PageManager::with_resolver(limits, resolver)),
            tokens: SpinLock::new(TokenTable::new(limits.max_tokens())),
        }
    }

    /// Run `f` with the page manager locked.
    pub fn with_pages<T>(&self, f: impl FnOnce(&PageManager<S, R>) -> T) -> T {
        self.pages.with_lock(|pm| f(pm))
    }

    /// # Errors
    /// See [`PageManager::init_memory_pools`].
    pub fn init_memory_pools(&self, force: bool) -> Result<()> {
        self.pages.with_lock(|pm| pm.init_memory_pools(force))
    }

    pub fn reset_memory_pools(&self) {
        self.pages.with_lock(PageManager::reset_memory_pools);
    }

    /// Register a reserved region and start managing its pages.
    ///
    /// With the region's `init` flag set the whole region is zeroed through a
    /// temporary kernel mapping before it becomes allocatable. The chunk is
    /// registered first with every page taken, so a rejected descriptor never
    /// touches memory and nothing is handed out before the zeroing is done.
    ///
    /// # Errors
    /// - [`OalError::InvalidRegion`] or [`OalError::TooManyRegions`] as for
    ///   [`PageManager::add_memory_pool`].
    /// - [`OalError::Map`] if zeroing cannot map the region; the region is
    ///   unregistered again then.
    pub fn add_reserved_memory_region<M: PhysMapper + ?Sized>(
        &self,
        region: RegionDescriptor,
        mapper: &M,
    ) -> Result<ChunkHandle> {
        let (handle, base) = self.pages.with_lock(|pm| {
            let handle = pm.add_memory_pool(region)?;
            if region.init() {
                pm.reserve_chunk(handle)?;
            }
            Ok::<_, OalError>((handle, pm.chunk(handle)?.base()))
        })?;
        if !region.init() {
            return Ok(handle);
        }

        info!("Zeroing region {} ({:#x} bytes at {base})", region.name(), region.size());
        match zero_physical(mapper, base, region.size()) {
            Ok(()) => {
                self.pages.with_lock(|pm| pm.release_chunk(handle))?;
                Ok(handle)
            }
            Err(e) => {
                error!("Region {} could not be zeroed: {e}", region.name());
                self.pages.with_lock(|pm| pm.remove_memory_pool(handle))?;
                Err(e)
            }
        }
    }

    /// Allocate whole pages for `size` bytes from chunk `chunk_id`.
    ///
    /// # Errors
    /// See [`PageManager::get_free_pages_from_chunk`].
    pub fn alloc(&self, chunk_id: u32, size: u64) -> Result<Allocation> {
        self.pages.with_lock(|pm| {
            let range = pm.get_free_pages_from_chunk(chunk_id, size)?;
            let chunk = pm.chunk(range.chunk)?;
            let allocation = Allocation {
                phys: chunk.page_address(range.start),
                size: pages_to_bytes::<S>(range.count as u64),
                align: chunk.region().align(),
                chunk_id: chunk.start_id(),
            };
            debug!(
                "Allocated {:#x} bytes at {} from chunk {}",
                allocation.size, allocation.phys, allocation.chunk_id
            );
            Ok(allocation)
        })
    }

    /// Return the pages covering `[phys, phys + size)`.
    ///
    /// # Errors
    /// - [`OalError::NotFound`] if the range is outside every chunk.
    /// - [`OalError::InvalidArgument`] for a zero size or an address that is
    ///   not on a page boundary.
    /// - [`OalError::DoubleFree`] if any page was not allocated.
    pub fn free(&self, phys: PhysicalAddress, size: u64) -> Result<()> {
        self.pages.with_lock(|pm| {
            let handle = pm
                .get_memory_chunk_based_on_addr(phys, size)
                .inspect_err(|_| error!("No chunk holds {phys}+{size:#x}"))?;
            let chunk = pm.chunk(handle)?;
            if !phys
                .offset_from(chunk.base())
                .is_some_and(is_page_aligned::<S>)
            {
                error!("Releasing {phys} which is not on a page boundary");
                return Err(OalError::InvalidArgument);
            }
            let start = chunk.page_index(phys).ok_or(OalError::NotFound)?;
            let count =
                usize::try_from(page_count::<S>(size)).map_err(|_| OalError::InvalidArgument)?;
            pm.set_free_pages(handle, start, count)
        })
    }

    /// Allocations with at least one page not yet freed.
    ///
    /// Freeing part of an allocation keeps it counted. A free that punches a
    /// hole into one leaves two.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.pages.with_lock(|pm| pm.live_allocations())
    }

    /// # Errors
    /// See [`TokenTable::create`].
    pub fn create_token(&self, phys: PhysicalAddress, size: u64) -> Result<Token> {
        self.tokens.with_lock(|t| t.create(phys, size))
    }

    /// # Errors
    /// See [`TokenTable::get_info`].
    pub fn get_token_info(&self, token: Token) -> Result<TokenInfo> {
        self.tokens.with_lock(|t| t.get_info(token))
    }

    /// # Errors
    /// See [`TokenTable::release`].
    pub fn release_token(&self, token: Token) -> Result<TokenInfo> {
        self.tokens.with_lock(|t| t.release(token))
    }

    #[must_use]
    pub fn live_tokens(&self) -> usize {
        self.tokens.with_lock(|t| t.live())
    }
}

impl<S: PageSize, R: PhysBaseResolver> TokenService for MemoryAllocator<S, R> {
    fn token_info(&self, token: Token) -> Result<TokenInfo> {
        self.get_token_info(token)
    }

    fn release_token(&self, token: Token) -> Result<()> {
        self.tokens.with_lock(|t| t.release(token)).map(|_| ())
    }
}
