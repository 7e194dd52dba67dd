use oal_abi::flags::{CHUNK_ID_AUTO, CHUNK_ID_DDR0, CHUNK_ID_SRAM_SINGLE};
use oal_abi::{AllocFlags, MemoryAccess};
use oal_alloc::{
    CachePolicy, Limits, MapError, MapSpace, MappedAddress, MemoryAllocator, OalError,
    PhysMapper, RegionDescriptor,
};
use oal_driver::Dispatcher;
use oal_memory_addresses::{PhysicalAddress, VirtualAddress};
use oal_user::{Memory, VirtMemManager};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const DDR: u64 = 0x8000_0000;
const SRAM: u64 = 0x2400_0000;

/// Kernel-side mapper; none of these tests zero memory.
struct NoKernelViews;

unsafe impl PhysMapper for NoKernelViews {
    fn map(
        &self,
        _pa: PhysicalAddress,
        _len: u64,
        _space: MapSpace,
        _policy: CachePolicy,
    ) -> Result<VirtualAddress, MapError> {
        Err(MapError::Rejected)
    }

    fn unmap(&self, _va: VirtualAddress, _len: u64, _space: MapSpace) -> Result<(), MapError> {
        Err(MapError::NotMapped)
    }
}

/// One process' address space.
#[derive(Default)]
struct Process {
    next: AtomicU64,
    refuse: AtomicBool,
    refuse_unmap: AtomicBool,
    live: Mutex<Vec<(VirtualAddress, PhysicalAddress, CachePolicy)>>,
}

impl Process {
    fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

unsafe impl PhysMapper for Process {
    fn map(
        &self,
        pa: PhysicalAddress,
        len: u64,
        space: MapSpace,
        policy: CachePolicy,
    ) -> Result<VirtualAddress, MapError> {
        assert_eq!(space, MapSpace::User);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(MapError::NoAddressSpace);
        }
        let va = VirtualAddress::new(0x4000_0000 + self.next.fetch_add(len, Ordering::SeqCst));
        self.live.lock().unwrap().push((va, pa, policy));
        Ok(va)
    }

    fn unmap(&self, va: VirtualAddress, _len: u64, _space: MapSpace) -> Result<(), MapError> {
        if self.refuse_unmap.load(Ordering::SeqCst) {
            return Err(MapError::Rejected);
        }
        let mut live = self.live.lock().unwrap();
        let i = live
            .iter()
            .position(|(v, _, _)| *v == va)
            .ok_or(MapError::NotMapped)?;
        live.remove(i);
        Ok(())
    }
}

fn driver() -> MemoryAllocator {
    let allocator = MemoryAllocator::new();
    allocator
        .add_reserved_memory_region(
            RegionDescriptor::new("ddr0", PhysicalAddress::new(DDR), 0x40000, 1).with_align(0x1000),
            &NoKernelViews,
        )
        .unwrap();
    allocator
        .add_reserved_memory_region(
            RegionDescriptor::new("sram", PhysicalAddress::new(SRAM), 0x10000, 3)
                .with_align(64)
                .with_autobalance(true),
            &NoKernelViews,
        )
        .unwrap();
    allocator
}

#[test]
fn allocate_map_share_and_free() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let (a_space, b_space) = (Process::default(), Process::default());
    let a = Memory::new(&dispatcher, &a_space);
    let b = Memory::new(&dispatcher, &b_space);

    let handle = a
        .alloc_memory(0x3000, AllocFlags::for_chunk(CHUNK_ID_DDR0))
        .unwrap();
    assert_eq!(
        a.return_address(handle, MemoryAccess::Physical),
        Ok(MappedAddress::Physical(PhysicalAddress::new(DDR)))
    );

    let cached = a
        .return_address(handle, MemoryAccess::CacheableWriteBack)
        .unwrap();
    assert_eq!(
        a.return_address(handle, MemoryAccess::CacheableWriteBack),
        Ok(cached)
    );
    let uncached = a
        .return_address(handle, MemoryAccess::NonCacheableBufferable)
        .unwrap();
    assert_ne!(cached, uncached);
    // Write-through shares the non-cacheable view.
    assert_eq!(
        a.return_address(handle, MemoryAccess::CacheableWriteThrough),
        Ok(uncached)
    );
    assert_eq!(a_space.live(), 2);

    let token = a.create_memory_token(handle).unwrap();
    let seen_by_b = b
        .map_memory_token(token, MemoryAccess::CacheableWriteBack)
        .unwrap();
    assert!(matches!(seen_by_b, MappedAddress::Virtual(_)));
    assert_eq!(
        b.map_memory_token(token, MemoryAccess::CacheableWriteBack),
        Err(OalError::AlreadyMapped)
    );
    assert_eq!(b_space.live.lock().unwrap()[0].1, PhysicalAddress::new(DDR));

    b.release_token(token).unwrap();
    assert_eq!(b_space.live(), 0);
    assert_eq!(b.unmap_memory_token(token), Err(OalError::NotMapped));
    assert_eq!(
        b.map_memory_token(token, MemoryAccess::Physical),
        Err(OalError::Released)
    );

    a.free_memory(handle).unwrap();
    assert_eq!(a_space.live(), 0);
    assert_eq!(allocator.live_allocations(), 0);
    assert_eq!(a.driver().memory_size_free(), Ok(0x50000));
}

#[test]
fn stale_handles_are_rejected() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    let memory = Memory::new(&dispatcher, &space);

    let old = memory
        .alloc_memory(0x1000, AllocFlags::for_chunk(CHUNK_ID_DDR0))
        .unwrap();
    memory.free_memory(old).unwrap();
    let new = memory
        .alloc_memory(0x1000, AllocFlags::for_chunk(CHUNK_ID_DDR0))
        .unwrap();
    assert_ne!(old, new);

    assert_eq!(memory.free_memory(old), Err(OalError::InvalidArgument));
    assert_eq!(
        memory.return_address(old, MemoryAccess::Physical),
        Err(OalError::InvalidArgument)
    );
    assert_eq!(memory.create_memory_token(old), Err(OalError::InvalidArgument));
    assert!(memory.return_address(new, MemoryAccess::Physical).is_ok());
}

#[test]
fn unmap_keeps_the_allocation() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    let memory = Memory::new(&dispatcher, &space);

    let (handle, first) = memory
        .alloc_and_map_memory(
            0x2000,
            AllocFlags::for_chunk(CHUNK_ID_DDR0),
            MemoryAccess::NonCacheableNonBuffered,
        )
        .unwrap();
    memory.unmap_memory(handle).unwrap();
    assert_eq!(space.live(), 0);
    assert_eq!(allocator.live_allocations(), 1);

    let again = memory
        .return_address(handle, MemoryAccess::NonCacheableNonBuffered)
        .unwrap();
    assert_ne!(first, again);
    memory.free_memory(handle).unwrap();
}

#[test]
fn auto_chunk_id_picks_an_autobalanced_chunk() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    let memory = Memory::new(&dispatcher, &space);

    let handle = memory
        .alloc_memory(0x1000, AllocFlags::for_chunk(CHUNK_ID_AUTO))
        .unwrap();
    assert_eq!(
        memory.return_address(handle, MemoryAccess::Physical),
        Ok(MappedAddress::Physical(PhysicalAddress::new(SRAM)))
    );

    let a = memory
        .driver()
        .alloc(0x1000, AllocFlags::for_chunk(CHUNK_ID_SRAM_SINGLE))
        .unwrap();
    assert_eq!((a.chunk_id, a.align), (3, 64));
}

#[test]
fn failed_mapping_returns_the_pages() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    space.refuse.store(true, Ordering::SeqCst);
    let memory = Memory::new(&dispatcher, &space);

    assert_eq!(
        memory.alloc_and_map_memory(
            0x1000,
            AllocFlags::for_chunk(CHUNK_ID_DDR0),
            MemoryAccess::CacheableWriteBack
        ),
        Err(OalError::Map(MapError::NoAddressSpace))
    );
    assert_eq!(allocator.live_allocations(), 0);
}

#[test]
fn allocation_table_capacity() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    let memory = Memory::with_limits(
        &dispatcher,
        &space,
        Limits::DEFAULT.with_max_allocations(1),
    );

    memory
        .alloc_memory(0x1000, AllocFlags::for_chunk(CHUNK_ID_DDR0))
        .unwrap();
    assert_eq!(
        memory.alloc_memory(0x1000, AllocFlags::for_chunk(CHUNK_ID_DDR0)),
        Err(OalError::PoolFull)
    );
    assert_eq!(allocator.live_allocations(), 1);
}

#[test]
fn driver_statistics() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    let memory = Memory::new(&dispatcher, &space);
    let client = memory.driver();

    assert_eq!(client.memory_size_total(), Ok(0x50000));
    assert_eq!(client.devices_mask(), Ok(0b1010));
    assert_eq!(client.autobalance_mask(), Ok(0b1000));
    assert_eq!(client.chunk_base(3), Ok(PhysicalAddress::new(SRAM)));
    assert_eq!(client.chunk_size(1), Ok(0x40000));
    assert_eq!(client.chunk_size(5), Err(OalError::NotFound));
    assert_eq!(client.chunk_count(), Ok(2));

    let chunks = client.chunks().unwrap();
    let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["ddr0", "sram"]);
}

#[test]
fn views_are_reference_counted() {
    let space = Process::default();
    let views = VirtMemManager::new(&space, 4);
    let pa = PhysicalAddress::new(DDR);

    let first = views.map(pa, 0x1000, CachePolicy::Cacheable).unwrap();
    let second = views.map(pa, 0x1000, CachePolicy::Cacheable).unwrap();
    assert_eq!(first, second);
    assert_eq!(space.live(), 1);
    assert_ne!(
        views.map(pa, 0x1000, CachePolicy::NonCacheable).unwrap(),
        first
    );
    assert_eq!(views.view_count(), 2);

    views.unmap(first).unwrap();
    assert_eq!(space.live(), 2);
    views.unmap(first).unwrap();
    assert_eq!(space.live(), 1);
    assert_eq!(views.unmap(first), Err(OalError::NotMapped));
}

#[test]
fn free_returns_the_pages_when_unmapping_fails() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    let memory = Memory::new(&dispatcher, &space);

    let (handle, _) = memory
        .alloc_and_map_memory(
            0x3000,
            AllocFlags::for_chunk(CHUNK_ID_DDR0),
            MemoryAccess::CacheableWriteBack,
        )
        .unwrap();
    space.refuse_unmap.store(true, Ordering::SeqCst);

    assert_eq!(
        memory.free_memory(handle),
        Err(OalError::Map(MapError::Rejected))
    );
    assert_eq!(allocator.live_allocations(), 0);
    assert_eq!(memory.driver().memory_size_free(), Ok(0x50000));
    assert_eq!(memory.free_memory(handle), Err(OalError::InvalidArgument));
    // The view the OS kept is still tracked.
    assert_eq!(memory.views().view_count(), 1);
}

#[test]
fn failed_unmap_can_be_retried() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let space = Process::default();
    let memory = Memory::new(&dispatcher, &space);

    let (handle, cached) = memory
        .alloc_and_map_memory(
            0x2000,
            AllocFlags::for_chunk(CHUNK_ID_DDR0),
            MemoryAccess::CacheableWriteBack,
        )
        .unwrap();
    memory
        .return_address(handle, MemoryAccess::NonCacheableNonBuffered)
        .unwrap();

    space.refuse_unmap.store(true, Ordering::SeqCst);
    assert_eq!(
        memory.unmap_memory(handle),
        Err(OalError::Map(MapError::Rejected))
    );
    assert_eq!(space.live(), 2);
    assert_eq!(
        memory.return_address(handle, MemoryAccess::CacheableWriteBack),
        Ok(cached)
    );

    space.refuse_unmap.store(false, Ordering::SeqCst);
    memory.unmap_memory(handle).unwrap();
    assert_eq!(space.live(), 0);
    assert_eq!(memory.views().view_count(), 0);
    memory.free_memory(handle).unwrap();
    assert_eq!(allocator.live_allocations(), 0);
}

#[test]
fn token_unmap_failure_keeps_the_token_mapped() {
    let allocator = driver();
    let dispatcher = Dispatcher::new(&allocator, &NoKernelViews);
    let (a_space, b_space) = (Process::default(), Process::default());
    let a = Memory::new(&dispatcher, &a_space);
    let b = Memory::new(&dispatcher, &b_space);

    let handle = a
        .alloc_memory(0x1000, AllocFlags::for_chunk(CHUNK_ID_DDR0))
        .unwrap();
    let token = a.create_memory_token(handle).unwrap();
    b.map_memory_token(token, MemoryAccess::CacheableWriteBack)
        .unwrap();

    b_space.refuse_unmap.store(true, Ordering::SeqCst);
    assert_eq!(
        b.release_token(token),
        Err(OalError::Map(MapError::Rejected))
    );
    assert_eq!(b_space.live(), 1);

    b_space.refuse_unmap.store(false, Ordering::SeqCst);
    b.release_token(token).unwrap();
    assert_eq!(b_space.live(), 0);
    a.free_memory(handle).unwrap();
}
