use alloc::vec;
use alloc::vec::Vec;
use log::{debug, error};
use oal_abi::flags::CHUNK_ID_AUTO;
use oal_abi::{
    AllocFlags, AllocRequest, Command, FreeRequest, ReservedRegion, TokenRequest, Transport,
    WireRecord,
};
use oal_alloc::limits::AUTOBALANCE_CHUNK_ID;
use oal_alloc::{Allocation, Result, Token, TokenInfo, TokenService};
use oal_memory_addresses::PhysicalAddress;

/// Largest fixed-size record of the command set.
const RECORD_BUF: usize = 64;

#[allow(clippy::cast_possible_truncation)]
const AUTOBALANCE_WIRE_ID: u8 = AUTOBALANCE_CHUNK_ID as u8;

/// Typed access to the pool manager driver.
pub struct DriverClient<T: Transport> {
    transport: T,
}

impl<T: Transport> DriverClient<T> {
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    fn call<Q: WireRecord, P: WireRecord>(&self, command: Command, request: &Q) -> Result<P> {
        let mut req = [0u8; RECORD_BUF];
        let len = request.encode(&mut req)?;
        let mut reply = [0u8; RECORD_BUF];
        let n = self.transport.call(command, &req[..len], &mut reply)?;
        Ok(P::decode(&reply[..n])?)
    }

    fn query(&self, command: Command) -> Result<u64> {
        self.call(command, &0u64)
    }

    /// Allocate `size` bytes from the chunk selected by `flags`.
    ///
    /// [`CHUNK_ID_AUTO`] lets the driver pick an autobalanced chunk.
    ///
    /// # Errors
    /// The driver's failure, typically `NotFound` or `OutOfMemory`.
    pub fn alloc(&self, size: u64, flags: AllocFlags) -> Result<Allocation> {
        let chunk_id = match flags.chunk_id() {
            CHUNK_ID_AUTO => AUTOBALANCE_WIRE_ID,
            id => id,
        };
        let request = AllocRequest {
            size,
            align: 0,
            phys: 0,
            chunk_id,
            flags,
        };
        let reply: AllocRequest = self
            .call(Command::Alloc, &request)
            .inspect_err(|e| {
                error!("Allocation of {size:#x} bytes from chunk {chunk_id} failed: {e}");
            })?;
        debug!("Allocated {:#x} bytes at {:#x}", reply.size, reply.phys);
        Ok(Allocation {
            phys: PhysicalAddress::new(reply.phys),
            size: reply.size,
            align: reply.align,
            chunk_id: u32::from(reply.chunk_id),
        })
    }

    /// # Errors
    /// The driver's failure, e.g. `DoubleFree`.
    pub fn free(&self, phys: PhysicalAddress, size: u64) -> Result<()> {
        let mut req = [0u8; FreeRequest::SIZE];
        FreeRequest {
            phys: phys.as_u64(),
            size,
        }
        .encode(&mut req)?;
        self.transport.call(Command::Free, &req, &mut [])?;
        Ok(())
    }

    /// # Errors
    /// The driver's failure, e.g. `Overlap`.
    pub fn create_token(&self, phys: PhysicalAddress, size: u64) -> Result<Token> {
        let reply: TokenRequest = self.call(
            Command::CreateToken,
            &TokenRequest {
                phys: phys.as_u64(),
                size,
                token: 0,
            },
        )?;
        Ok(Token::from_raw(reply.token))
    }

    fn token_command(&self, command: Command, token: Token) -> Result<TokenInfo> {
        let reply: TokenRequest = self.call(
            command,
            &TokenRequest {
                token: token.as_raw(),
                ..TokenRequest::default()
            },
        )?;
        Ok(TokenInfo {
            phys: PhysicalAddress::new(reply.phys),
            size: reply.size,
        })
    }

    /// # Errors
    /// Transport failures.
    pub fn memory_size_free(&self) -> Result<u64> {
        self.query(Command::MemorySizeFreeGet)
    }

    /// # Errors
    /// Transport failures.
    pub fn memory_size_total(&self) -> Result<u64> {
        self.query(Command::MemorySizeTotalGet)
    }

    /// Bit `id` set for every registered chunk.
    ///
    /// # Errors
    /// Transport failures.
    pub fn devices_mask(&self) -> Result<u64> {
        self.query(Command::MemoryGetDevices)
    }

    /// # Errors
    /// Transport failures.
    pub fn autobalance_mask(&self) -> Result<u64> {
        self.query(Command::MemoryGetAutobalance)
    }

    /// Number of outstanding allocations in the driver.
    ///
    /// # Errors
    /// Transport failures.
    pub fn live_allocations(&self) -> Result<u64> {
        self.query(Command::Info)
    }

    /// # Errors
    /// `NotFound` for an unknown chunk.
    pub fn chunk_base(&self, chunk_id: u32) -> Result<PhysicalAddress> {
        self.call(Command::MemoryGetBase, &u64::from(chunk_id))
            .map(PhysicalAddress::new)
    }

    /// # Errors
    /// `NotFound` for an unknown chunk.
    pub fn chunk_size(&self, chunk_id: u32) -> Result<u64> {
        self.call(Command::MemoryGetSize, &u64::from(chunk_id))
    }

    /// # Errors
    /// Transport failures.
    pub fn chunk_count(&self) -> Result<u8> {
        self.call(Command::GetNChunks, &0u8)
    }

    /// Every registered region as the driver reports it.
    ///
    /// # Errors
    /// Transport failures.
    pub fn chunks(&self) -> Result<Vec<ReservedRegion>> {
        let count = usize::from(self.chunk_count()?);
        let mut reply = vec![0u8; count * ReservedRegion::SIZE];
        let n = self.transport.call(Command::GetChunks, &[], &mut reply)?;
        reply[..n]
            .chunks_exact(ReservedRegion::SIZE)
            .map(|record| ReservedRegion::decode(record).map_err(Into::into))
            .collect()
    }
}

impl<T: Transport> TokenService for DriverClient<T> {
    fn token_info(&self, token: Token) -> Result<TokenInfo> {
        self.token_command(Command::GetToken, token)
    }

    fn release_token(&self, token: Token) -> Result<()> {
        self.token_command(Command::ReleaseToken, token).map(|_| ())
    }
}
