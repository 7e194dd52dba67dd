use oal_abi::{
    AllocFlags, AllocRequest, Command, FreeRequest, ReservedRegion, Status, TokenRequest,
    Transport, WireRecord,
};
use oal_alloc::{CachePolicy, MapError, MapSpace, MemoryAllocator, PhysMapper, RegionDescriptor};
use oal_driver::Dispatcher;
use oal_memory_addresses::{PhysicalAddress, VirtualAddress};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Kernel view of a tiny fake DRAM.
struct Ram {
    words: Box<[AtomicU64]>,
    maps: AtomicUsize,
}

impl Ram {
    fn new(bytes: usize) -> Self {
        Self {
            words: (0..bytes / 8).map(|_| AtomicU64::new(u64::MAX)).collect(),
            maps: AtomicUsize::new(0),
        }
    }
}

unsafe impl PhysMapper for Ram {
    fn map(
        &self,
        pa: PhysicalAddress,
        len: u64,
        space: MapSpace,
        _policy: CachePolicy,
    ) -> Result<VirtualAddress, MapError> {
        assert_eq!(space, MapSpace::Kernel);
        let offset = usize::try_from(pa.as_u64() - DDR).map_err(|_| MapError::Rejected)?;
        if offset + usize::try_from(len).map_err(|_| MapError::Rejected)? > self.words.len() * 8 {
            return Err(MapError::Rejected);
        }
        self.maps.fetch_add(1, Ordering::SeqCst);
        Ok(VirtualAddress::from_ptr(self.words[offset / 8..].as_ptr()))
    }

    fn unmap(&self, _va: VirtualAddress, _len: u64, _space: MapSpace) -> Result<(), MapError> {
        Ok(())
    }
}

const DDR: u64 = 0x8000_0000;
const SRAM: u64 = 0x2400_0000;

fn allocator(ram: &Ram) -> MemoryAllocator {
    let allocator = MemoryAllocator::new();
    allocator
        .add_reserved_memory_region(
            RegionDescriptor::new("ddr0@80000000", PhysicalAddress::new(DDR), 0x10000, 1)
                .with_align(0x1000)
                .with_autobalance(true),
            ram,
        )
        .unwrap();
    allocator
        .add_reserved_memory_region(
            RegionDescriptor::new("sram", PhysicalAddress::new(SRAM), 0x8000, 3).with_align(64),
            ram,
        )
        .unwrap();
    allocator
}

fn call<T: WireRecord>(
    transport: &impl Transport,
    command: Command,
    request: &impl WireRecord,
) -> Result<T, Status> {
    let mut req = [0u8; 64];
    let len = request.encode(&mut req)?;
    let mut reply = [0u8; 64];
    let n = transport.call(command, &req[..len], &mut reply)?;
    T::decode(&reply[..n])
}

fn alloc(transport: &impl Transport, chunk_id: u8, size: u64) -> Result<AllocRequest, Status> {
    let req = AllocRequest {
        size,
        chunk_id,
        flags: AllocFlags::for_chunk(chunk_id),
        ..AllocRequest::default()
    };
    call(transport, Command::Alloc, &req)
}

#[test]
fn alloc_reply_carries_address_size_and_alignment() {
    let ram = Ram::new(0);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);

    let reply = alloc(&driver, 1, 0x1800).unwrap();
    assert_eq!(reply.phys, DDR);
    assert_eq!(reply.size, 0x2000);
    assert_eq!(reply.align, 0x1000);
    assert_eq!(reply.chunk_id, 1);

    let sram = alloc(&driver, 3, 0x100).unwrap();
    assert_eq!((sram.phys, sram.align), (SRAM, 64));
}

#[test]
fn autobalance_id_reports_the_chosen_chunk() {
    let ram = Ram::new(0);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);

    let reply = alloc(&driver, 0xFF, 0x1000).unwrap();
    assert_eq!(reply.chunk_id, 1);
}

#[test]
fn zero_flag_clears_the_allocation() {
    let ram = Ram::new(0x2000);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);

    let req = AllocRequest {
        size: 0x2000,
        chunk_id: 1,
        flags: AllocFlags::for_chunk(1).with_zero(true),
        ..AllocRequest::default()
    };
    let reply: AllocRequest = call(&driver, Command::Alloc, &req).unwrap();
    assert_eq!(reply.phys, DDR);
    assert_eq!(ram.maps.load(Ordering::SeqCst), 1);
    assert!(ram.words.iter().all(|w| w.load(Ordering::SeqCst) == 0));
}

#[test]
fn zeroing_failure_returns_the_pages() {
    let ram = Ram::new(0x1000);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);

    let req = AllocRequest {
        size: 0x4000,
        chunk_id: 1,
        flags: AllocFlags::for_chunk(1).with_zero(true),
        ..AllocRequest::default()
    };
    assert_eq!(
        call::<AllocRequest>(&driver, Command::Alloc, &req),
        Err(Status::MapFailed)
    );
    assert_eq!(allocator.live_allocations(), 0);
    assert_eq!(allocator.with_pages(|pm| pm.free_size()), 0x18000);
}

#[test]
fn free_and_statistics() {
    let ram = Ram::new(0);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);

    assert_eq!(call::<u64>(&driver, Command::MemorySizeTotalGet, &0u64), Ok(0x18000));
    let a = alloc(&driver, 1, 0x4000).unwrap();
    assert_eq!(call::<u64>(&driver, Command::MemorySizeFreeGet, &0u64), Ok(0x14000));
    assert_eq!(call::<u64>(&driver, Command::Info, &0u64), Ok(1));

    let free = FreeRequest {
        phys: a.phys,
        size: a.size,
    };
    let mut req = [0u8; FreeRequest::SIZE];
    free.encode(&mut req).unwrap();
    assert_eq!(driver.call(Command::Free, &req, &mut []), Ok(0));
    assert_eq!(driver.call(Command::Free, &req, &mut []), Err(Status::DoubleFree));

    assert_eq!(call::<u64>(&driver, Command::MemorySizeFreeGet, &0u64), Ok(0x18000));
    assert_eq!(call::<u64>(&driver, Command::MemoryGetDevices, &0u64), Ok(0b1010));
    assert_eq!(call::<u64>(&driver, Command::MemoryGetAutobalance, &0u64), Ok(0b10));
    assert_eq!(call::<u64>(&driver, Command::MemoryGetBase, &3u64), Ok(SRAM));
    assert_eq!(call::<u64>(&driver, Command::MemoryGetSize, &1u64), Ok(0x10000));
    assert_eq!(
        call::<u64>(&driver, Command::MemoryGetSize, &7u64),
        Err(Status::NotFound)
    );
}

#[test]
fn chunk_listing() {
    let ram = Ram::new(0);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);

    assert_eq!(call::<u8>(&driver, Command::GetNChunks, &0u8), Ok(2));

    let mut reply = [0u8; 2 * ReservedRegion::SIZE];
    let n = driver.call(Command::GetChunks, &[], &mut reply).unwrap();
    assert_eq!(n, reply.len());
    let first = ReservedRegion::decode(&reply).unwrap();
    let second = ReservedRegion::decode(&reply[ReservedRegion::SIZE..]).unwrap();
    assert_eq!(first.name.as_str(), "ddr0");
    assert_eq!((first.id, first.start, first.size), (1, DDR, 0x10000));
    assert_eq!((second.id, second.start), (3, SRAM));

    let mut short = [0u8; ReservedRegion::SIZE];
    assert_eq!(
        driver.call(Command::GetChunks, &[], &mut short),
        Err(Status::BadMessage)
    );
}

#[test]
fn token_commands() {
    let ram = Ram::new(0);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);
    let a = alloc(&driver, 1, 0x2000).unwrap();

    let created: TokenRequest = call(
        &driver,
        Command::CreateToken,
        &TokenRequest {
            phys: a.phys,
            size: a.size,
            token: 0,
        },
    )
    .unwrap();
    assert_ne!(created.token, 0);

    let lookup = TokenRequest {
        token: created.token,
        ..TokenRequest::default()
    };
    let info: TokenRequest = call(&driver, Command::GetToken, &lookup).unwrap();
    assert_eq!((info.phys, info.size), (a.phys, a.size));

    assert!(call::<TokenRequest>(&driver, Command::ReleaseToken, &lookup).is_ok());
    assert_eq!(
        call::<TokenRequest>(&driver, Command::GetToken, &lookup),
        Err(Status::Released)
    );
    let garbage = TokenRequest {
        token: 0x55,
        ..TokenRequest::default()
    };
    assert_eq!(
        call::<TokenRequest>(&driver, Command::GetToken, &garbage),
        Err(Status::CorruptToken)
    );
}

#[test]
fn malformed_and_unsupported_commands() {
    let ram = Ram::new(0);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);

    assert_eq!(
        driver.call(Command::Alloc, &[0u8; 8], &mut [0u8; 64]),
        Err(Status::BadMessage)
    );
    for command in [Command::Flush, Command::Buffer, Command::Size] {
        assert_eq!(driver.call(command, &[], &mut []), Err(Status::Unsupported));
    }
}

#[test]
fn info_counts_a_split_free_once() {
    let ram = Ram::new(0);
    let allocator = allocator(&ram);
    let driver = Dispatcher::new(&allocator, &ram);
    let a = alloc(&driver, 1, 0x4000).unwrap();

    let free = |phys: u64, size: u64| {
        let mut req = [0u8; FreeRequest::SIZE];
        FreeRequest { phys, size }.encode(&mut req).unwrap();
        driver.call(Command::Free, &req, &mut [])
    };
    assert_eq!(free(a.phys, 0x1000), Ok(0));
    assert_eq!(call::<u64>(&driver, Command::Info, &0u64), Ok(1));
    assert_eq!(free(a.phys + 0x1000, 0x3000), Ok(0));
    assert_eq!(call::<u64>(&driver, Command::Info, &0u64), Ok(0));
}
