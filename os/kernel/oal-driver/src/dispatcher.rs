use log::{debug, error, warn};
use oal_abi::{
    AllocRequest, Command, FreeRequest, ReservedRegion, Status, TokenRequest, Transport,
    WireRecord,
};
use oal_alloc::{
    IdentityBase, MemoryAllocator, PageManager, PhysBaseResolver, PhysMapper, Token,
    zero_physical,
};
use oal_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// Serves driver commands against one allocator context.
///
/// `mapper` is only used to zero allocations that ask for it.
pub struct Dispatcher<'a, M, S = Size4K, R = IdentityBase>
where
    M: PhysMapper + ?Sized,
    S: PageSize,
    R: PhysBaseResolver,
{
    allocator: &'a MemoryAllocator<S, R>,
    mapper: &'a M,
}

impl<'a, M, S, R> Dispatcher<'a, M, S, R>
where
    M: PhysMapper + ?Sized,
    S: PageSize,
    R: PhysBaseResolver,
{
    #[must_use]
    pub const fn new(allocator: &'a MemoryAllocator<S, R>, mapper: &'a M) -> Self {
        Self { allocator, mapper }
    }

    #[must_use]
    pub const fn allocator(&self) -> &'a MemoryAllocator<S, R> {
        self.allocator
    }

    fn alloc(&self, request: &[u8], reply: &mut [u8]) -> Result<usize, Status> {
        let mut req = AllocRequest::decode(request)?;
        let allocation = self.allocator.alloc(u32::from(req.chunk_id), req.size)?;

        if req.flags.zero()
            && let Err(e) = zero_physical(self.mapper, allocation.phys, allocation.size)
        {
            error!(
                "Failed to zero {:#x} bytes at {}: {e}",
                allocation.size, allocation.phys
            );
            self.allocator.free(allocation.phys, allocation.size)?;
            return Err(e.into());
        }

        req.phys = allocation.phys.as_u64();
        req.size = allocation.size;
        req.align = allocation.align;
        if let Ok(id) = u8::try_from(allocation.chunk_id) {
            req.chunk_id = id;
        }
        req.encode(reply)
    }

    fn free(&self, request: &[u8]) -> Result<usize, Status> {
        let req = FreeRequest::decode(request)?;
        self.allocator
            .free(PhysicalAddress::new(req.phys), req.size)?;
        Ok(0)
    }

    fn stat(
        &self,
        reply: &mut [u8],
        f: impl FnOnce(&PageManager<S, R>) -> u64,
    ) -> Result<usize, Status> {
        self.allocator.with_pages(f).encode(reply)
    }

    fn chunk_id(request: &[u8]) -> Result<u32, Status> {
        u32::try_from(u64::decode(request)?).map_err(|_| Status::InvalidArgument)
    }

    fn chunks(&self, reply: &mut [u8]) -> Result<usize, Status> {
        self.allocator.with_pages(|pm| -> Result<usize, Status> {
            let mut written = 0;
            for chunk in pm.chunks() {
                let region = chunk.region();
                let record = ReservedRegion {
                    name: region.name(),
                    id: region.start_id(),
                    start: region.phys_addr().as_u64(),
                    size: region.size(),
                };
                let out = reply.get_mut(written..).ok_or(Status::BadMessage)?;
                written += record.encode(out)?;
            }
            Ok(written)
        })
    }

    fn create_token(&self, request: &[u8], reply: &mut [u8]) -> Result<usize, Status> {
        let mut req = TokenRequest::decode(request)?;
        let token = self
            .allocator
            .create_token(PhysicalAddress::new(req.phys), req.size)?;
        req.token = token.as_raw();
        req.encode(reply)
    }

    fn get_token(&self, request: &[u8], reply: &mut [u8]) -> Result<usize, Status> {
        let mut req = TokenRequest::decode(request)?;
        let info = self
            .allocator
            .get_token_info(Token::from_raw(req.token))?;
        req.phys = info.phys.as_u64();
        req.size = info.size;
        req.encode(reply)
    }

    fn release_token(&self, request: &[u8], reply: &mut [u8]) -> Result<usize, Status> {
        let mut req = TokenRequest::decode(request)?;
        let info = self
            .allocator
            .release_token(Token::from_raw(req.token))?;
        req.phys = info.phys.as_u64();
        req.size = info.size;
        req.encode(reply)
    }

    fn dispatch(
        &self,
        command: Command,
        request: &[u8],
        reply: &mut [u8],
    ) -> Result<usize, Status> {
        match command {
            Command::Alloc => self.alloc(request, reply),
            Command::Free => self.free(request),
            Command::Info => (self.allocator.live_allocations() as u64).encode(reply),
            Command::MemorySizeFreeGet => self.stat(reply, PageManager::free_size),
            Command::MemorySizeTotalGet => self.stat(reply, PageManager::total_size),
            Command::MemoryGetDevices => self.stat(reply, PageManager::devices_mask),
            Command::MemoryGetAutobalance => self.stat(reply, PageManager::autobalance_mask),
            Command::MemoryGetBase => {
                let id = Self::chunk_id(request)?;
                let base = self
                    .allocator
                    .with_pages(|pm| pm.get_chunk_base_address(id))?;
                base.as_u64().encode(reply)
            }
            Command::MemoryGetSize => {
                let id = Self::chunk_id(request)?;
                self.allocator
                    .with_pages(|pm| pm.get_chunk_size(id))?
                    .encode(reply)
            }
            Command::GetNChunks => {
                let count = self.allocator.with_pages(PageManager::chunk_count);
                u8::try_from(count)
                    .map_err(|_| Status::OutOfRange)?
                    .encode(reply)
            }
            Command::GetChunks => self.chunks(reply),
            Command::CreateToken => self.create_token(request, reply),
            Command::GetToken => self.get_token(request, reply),
            Command::ReleaseToken => self.release_token(request, reply),
            Command::Size
            | Command::Buffer
            | Command::Flush
            | Command::FlushSpecific
            | Command::InvalidateSpecific
            | Command::FlushInvalidateSpecific => Err(Status::Unsupported),
        }
    }
}

impl<M, S, R> Transport for Dispatcher<'_, M, S, R>
where
    M: PhysMapper + ?Sized,
    S: PageSize,
    R: PhysBaseResolver,
{
    fn call(&self, command: Command, request: &[u8], reply: &mut [u8]) -> Result<usize, Status> {
        debug!("{command:?}: {} request bytes", request.len());
        self.dispatch(command, request, reply)
            .inspect_err(|status| warn!("{command:?} failed: {status}"))
    }
}
