use crate::bitset::Bitset;
use crate::error::{OalError, Result};
use crate::region::RegionDescriptor;
use crate::static_pool::StaticPool;
use core::marker::PhantomData;
use log::{debug, warn};
use oal_memory_addresses::{
    PageSize, PhysicalAddress, is_page_aligned, page_count, pages_to_bytes, whole_pages,
};

/// Page-granular allocator over one reserved region.
///
/// Only whole pages of the region are managed; a trailing partial page is
/// never handed out. `free_space` is kept in bytes and always equals the
/// managed size minus the bytes of all used pages.
///
/// The first page of every allocation is marked in a second bitset. A free
/// that cuts an allocation short moves the mark to the first page still in
/// use, so the marks always count the live allocated extents.
#[derive(Debug, Clone)]
pub struct MemoryChunk<S: PageSize> {
    region: RegionDescriptor,
    base: PhysicalAddress,
    pages: StaticPool,
    heads: Bitset,
    free_space: u64,
    search_hint: usize,
    _size: PhantomData<S>,
}

impl<S: PageSize> MemoryChunk<S> {
    /// # Errors
    /// [`OalError::InvalidRegion`] if the region holds no whole page.
    pub fn new(region: RegionDescriptor, base: PhysicalAddress) -> Result<Self> {
        let pages = usize::try_from(whole_pages::<S>(region.size()))
            .map_err(|_| OalError::InvalidRegion)?;
        if pages == 0 {
            return Err(OalError::InvalidRegion);
        }
        if !is_page_aligned::<S>(region.size()) {
            warn!(
                "Region {} size {:#x} is not a multiple of {}; managing {pages} pages",
                region.name(),
                region.size(),
                S::as_str()
            );
        }
        Ok(Self {
            region,
            base,
            pages: StaticPool::new(pages),
            heads: Bitset::new(pages),
            free_space: pages_to_bytes::<S>(pages as u64),
            search_hint: 0,
            _size: PhantomData,
        })
    }

    #[inline]
    #[must_use]
    pub const fn region(&self) -> &RegionDescriptor {
        &self.region
    }

    #[inline]
    #[must_use]
    pub const fn start_id(&self) -> u32 {
        self.region.start_id()
    }

    /// Base address allocations are computed from.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.pages.capacity()
    }

    #[inline]
    #[must_use]
    pub const fn managed_size(&self) -> u64 {
        pages_to_bytes::<S>(self.pages.capacity() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn free_space(&self) -> u64 {
        self.free_space
    }

    #[inline]
    #[must_use]
    pub const fn search_hint(&self) -> usize {
        self.search_hint
    }

    /// Allocations with at least one page still in use.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.heads.count_set()
    }

    #[inline]
    #[must_use]
    pub const fn pool(&self) -> &StaticPool {
        &self.pages
    }

    /// Whether `[pa, pa + size)` lies inside the managed range.
    #[must_use]
    pub fn contains(&self, pa: PhysicalAddress, size: u64) -> bool {
        let Some(offset) = pa.offset_from(self.base) else {
            return false;
        };
        offset
            .checked_add(size)
            .is_some_and(|end| end <= self.managed_size())
    }

    #[inline]
    #[must_use]
    pub fn page_address(&self, index: usize) -> PhysicalAddress {
        self.base + pages_to_bytes::<S>(index as u64)
    }

    /// Page index of `pa`, which must lie inside the chunk.
    #[must_use]
    pub fn page_index(&self, pa: PhysicalAddress) -> Option<usize> {
        let offset = pa.offset_from(self.base)?;
        if offset >= self.managed_size() {
            return None;
        }
        usize::try_from(offset >> S::SHIFT).ok()
    }

    /// Claim enough contiguous pages for `size` bytes, returning
    /// `(first_page, page_count)`.
    ///
    /// The scan starts at the search hint and wraps to page 0 once.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a zero size, [`OalError::OutOfMemory`]
    /// if no run of free pages is long enough.
    pub fn alloc_pages(&mut self, size: u64) -> Result<(usize, usize)> {
        if size == 0 {
            return Err(OalError::InvalidArgument);
        }
        if !is_page_aligned::<S>(size) {
            warn!(
                "Requested size {size:#x} is not {}-aligned; rounding up",
                S::as_str()
            );
        }
        let count =
            usize::try_from(page_count::<S>(size)).map_err(|_| OalError::OutOfMemory)?;

        let start = match self.pages.alloc_range_from(self.search_hint, count) {
            Err(OalError::OutOfMemory) if self.search_hint != 0 => {
                self.pages.alloc_range_from(0, count)?
            }
            other => other?,
        };

        self.search_hint = start + count;
        self.heads.set_bit(start);
        self.free_space -= pages_to_bytes::<S>(count as u64);
        debug!(
            "Chunk {}: pages {start}..{} taken, {:#x} bytes left",
            self.start_id(),
            start + count,
            self.free_space
        );
        Ok((start, count))
    }

    /// Return `count` pages starting at `start`.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for a zero count or a range past the
    /// chunk, [`OalError::DoubleFree`] if any page in it is not allocated.
    pub fn free_pages(&mut self, start: usize, count: usize) -> Result<()> {
        self.pages.free_range(start, count).map_err(|e| match e {
            OalError::OutOfRange => OalError::InvalidArgument,
            other => other,
        })?;
        self.heads.fill_range(start, count, false);
        let next = start + count;
        if next < self.page_count() && self.pages.is_used(next) && !self.heads.is_set(next) {
            self.heads.set_bit(next);
        }
        self.free_space += pages_to_bytes::<S>(count as u64);
        if self.pages.is_empty() {
            self.search_hint = 0;
        }
        debug!(
            "Chunk {}: pages {start}..{} returned, {:#x} bytes free",
            self.start_id(),
            start + count,
            self.free_space
        );
        Ok(())
    }

    /// Take every page without recording an allocation.
    ///
    /// Keeps the chunk registered but unusable until [`reset`](Self::reset).
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] if any page is already in use.
    pub fn reserve_all(&mut self) -> Result<()> {
        if !self.pages.is_empty() {
            return Err(OalError::InvalidArgument);
        }
        self.pages.mark_used_range(0, self.page_count())?;
        self.free_space = 0;
        Ok(())
    }

    /// Forget every allocation.
    pub fn reset(&mut self) {
        self.pages.init();
        self.heads.init();
        self.free_space = self.managed_size();
        self.search_hint = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oal_memory_addresses::Size4K;

    fn chunk(size: u64) -> MemoryChunk<Size4K> {
        let region = RegionDescriptor::new("ddr", PhysicalAddress::new(0x1000_0000), size, 1);
        MemoryChunk::new(region, region.phys_addr()).unwrap()
    }

    fn accounting_holds(c: &MemoryChunk<Size4K>) -> bool {
        c.pool().used() as u64 * Size4K::SIZE == c.managed_size() - c.free_space()
    }

    #[test]
    fn partial_trailing_page_is_not_managed() {
        let c = chunk(0x2800);
        assert_eq!(c.page_count(), 2);
        assert_eq!(c.free_space(), 0x2000);
        assert!(c.contains(PhysicalAddress::new(0x1000_1FFF), 1));
        assert!(!c.contains(PhysicalAddress::new(0x1000_2000), 1));
    }

    #[test]
    fn region_without_pages_is_rejected() {
        let region = RegionDescriptor::new("tiny", PhysicalAddress::new(0), 0x800, 0);
        assert!(matches!(
            MemoryChunk::<Size4K>::new(region, region.phys_addr()),
            Err(OalError::InvalidRegion)
        ));
    }

    #[test]
    fn sizes_round_up_to_pages() {
        let mut c = chunk(0x10000);
        assert_eq!(c.alloc_pages(1), Ok((0, 1)));
        assert_eq!(c.alloc_pages(0x1001), Ok((1, 2)));
        assert_eq!(c.free_space(), 0xD000);
        assert!(accounting_holds(&c));
    }

    #[test]
    fn search_hint_wraps_to_the_start() {
        let mut c = chunk(0x8000);
        assert_eq!(c.alloc_pages(0x4000), Ok((0, 4)));
        assert_eq!(c.alloc_pages(0x3000), Ok((4, 3)));
        c.free_pages(0, 4).unwrap();
        assert_eq!(c.search_hint(), 7);
        // Only one page after the hint; the run at 0 is found on wrap.
        assert_eq!(c.alloc_pages(0x2000), Ok((0, 2)));
        assert_eq!(c.search_hint(), 2);
        assert!(accounting_holds(&c));
    }

    #[test]
    fn hint_resets_once_empty() {
        let mut c = chunk(0x8000);
        let (start, count) = c.alloc_pages(0x3000).unwrap();
        c.free_pages(start, count).unwrap();
        assert_eq!(c.search_hint(), 0);
        assert_eq!(c.free_space(), 0x8000);
    }

    #[test]
    fn free_validates_ranges() {
        let mut c = chunk(0x4000);
        c.alloc_pages(0x1000).unwrap();
        assert_eq!(c.free_pages(0, 0), Err(OalError::InvalidArgument));
        assert_eq!(c.free_pages(3, 2), Err(OalError::InvalidArgument));
        assert_eq!(c.free_pages(0, 2), Err(OalError::DoubleFree));
        assert_eq!(c.free_space(), 0x3000);
    }

    #[test]
    fn exhaustion_is_out_of_memory() {
        let mut c = chunk(0x4000);
        assert_eq!(c.alloc_pages(0x5000), Err(OalError::OutOfMemory));
        assert_eq!(c.alloc_pages(0), Err(OalError::InvalidArgument));
        c.alloc_pages(0x4000).unwrap();
        assert_eq!(c.alloc_pages(0x1000), Err(OalError::OutOfMemory));
    }

    #[test]
    fn split_frees_count_as_one_allocation() {
        let mut c = chunk(0x8000);
        assert_eq!(c.alloc_pages(0x4000), Ok((0, 4)));
        assert_eq!(c.alloc_pages(0x2000), Ok((4, 2)));
        assert_eq!(c.allocation_count(), 2);

        // Head page only: the rest of the first allocation stays counted.
        c.free_pages(0, 1).unwrap();
        assert_eq!(c.allocation_count(), 2);
        c.free_pages(1, 3).unwrap();
        assert_eq!(c.allocation_count(), 1);

        // A hole in the middle leaves two live extents.
        let (start, _) = c.alloc_pages(0x3000).unwrap();
        c.free_pages(start + 1, 1).unwrap();
        assert_eq!(c.allocation_count(), 3);
        c.free_pages(start, 1).unwrap();
        c.free_pages(start + 2, 1).unwrap();
        assert_eq!(c.allocation_count(), 1);

        // Across the end of one allocation into the next.
        assert_eq!(c.alloc_pages(0x2000), Ok((6, 2)));
        assert_eq!(c.allocation_count(), 2);
        c.free_pages(5, 2).unwrap();
        assert_eq!(c.allocation_count(), 2);
        c.free_pages(4, 1).unwrap();
        c.free_pages(7, 1).unwrap();
        assert_eq!(c.allocation_count(), 0);
        assert!(accounting_holds(&c));
    }

    #[test]
    fn reserved_chunk_hands_out_nothing() {
        let mut c = chunk(0x4000);
        c.reserve_all().unwrap();
        assert_eq!(c.free_space(), 0);
        assert_eq!(c.allocation_count(), 0);
        assert_eq!(c.alloc_pages(0x1000), Err(OalError::OutOfMemory));
        assert!(accounting_holds(&c));

        c.reset();
        assert_eq!(c.free_space(), 0x4000);
        c.alloc_pages(0x1000).unwrap();
        assert_eq!(c.reserve_all(), Err(OalError::InvalidArgument));
    }

    #[test]
    fn page_index_and_address_agree() {
        let c = chunk(0x10000);
        let pa = c.page_address(5);
        assert_eq!(pa, PhysicalAddress::new(0x1000_5000));
        assert_eq!(c.page_index(pa + 0x10), Some(5));
        assert_eq!(c.page_index(PhysicalAddress::new(0x0FFF_FFFF)), None);
        assert_eq!(c.page_index(PhysicalAddress::new(0x1001_0000)), None);
    }
}
