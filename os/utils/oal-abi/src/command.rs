/// Numbered driver commands.
///
/// The numbering is part of the driver ABI and must not be reordered.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Command {
    /// Allocate pages; request and reply are [`AllocRequest`](crate::AllocRequest).
    Alloc = 0,
    /// Return pages; request is [`FreeRequest`](crate::FreeRequest).
    Free = 1,
    Size = 2,
    Buffer = 3,
    Flush = 4,
    FlushSpecific = 5,
    InvalidateSpecific = 6,
    FlushInvalidateSpecific = 7,
    Info = 8,
    /// Free bytes over all chunks, `u64` reply.
    MemorySizeFreeGet = 9,
    /// Managed bytes over all chunks, `u64` reply.
    MemorySizeTotalGet = 10,
    /// Bit mask of registered chunk ids, `u64` reply.
    MemoryGetDevices = 11,
    /// Bit mask of autobalanced chunk ids, `u64` reply.
    MemoryGetAutobalance = 12,
    /// Resolved base of a chunk; `u64` chunk id in, `u64` out.
    MemoryGetBase = 13,
    /// Managed size of a chunk; `u64` chunk id in, `u64` out.
    MemoryGetSize = 14,
    /// Number of chunks, `u8` reply.
    GetNChunks = 15,
    /// Every chunk as a [`ReservedRegion`](crate::ReservedRegion), back to back.
    GetChunks = 16,
    /// [`TokenRequest`](crate::TokenRequest) with `phys`/`size` in, `token` out.
    CreateToken = 17,
    /// [`TokenRequest`](crate::TokenRequest) with `token` in, `phys`/`size` out.
    GetToken = 18,
    /// [`TokenRequest`](crate::TokenRequest) with `token` in.
    ReleaseToken = 19,
}

impl Command {
    const ALL: [Self; 20] = [
        Self::Alloc,
        Self::Free,
        Self::Size,
        Self::Buffer,
        Self::Flush,
        Self::FlushSpecific,
        Self::InvalidateSpecific,
        Self::FlushInvalidateSpecific,
        Self::Info,
        Self::MemorySizeFreeGet,
        Self::MemorySizeTotalGet,
        Self::MemoryGetDevices,
        Self::MemoryGetAutobalance,
        Self::MemoryGetBase,
        Self::MemoryGetSize,
        Self::GetNChunks,
        Self::GetChunks,
        Self::CreateToken,
        Self::GetToken,
        Self::ReleaseToken,
    ];

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if (raw as usize) < Self::ALL.len() {
            Some(Self::ALL[raw as usize])
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}
