//! # Table Limits
//!
//! Every table of the pool manager has a fixed capacity chosen once, when the
//! allocator is constructed. The constants are the platform defaults; a
//! [`Limits`] value carries the capacities actually used.

use oal_accessors_derive::Accessors;

/// Maximum number of reserved regions (and therefore chunks).
pub const MAX_RESERVED_REGIONS: usize = 6;

/// Highest accepted region start id.
pub const MAX_RESERVED_ID: u32 = 9;

/// Largest region a single chunk will manage, in bytes.
pub const MAX_REGION_SIZE: u64 = 0x2000_0000;

/// Live shared-memory tokens per driver instance.
pub const MAX_SHARED_TOKENS_PER_DRIVER: usize = 400;

/// Tokens one process may have mapped at a time.
pub const MAX_SHARED_TOKENS_PER_PROCESS: usize = 40;

/// Outstanding allocations tracked by one user-space process.
pub const MAX_USER_ALLOCATIONS: usize = 8000;

/// Chunk id that asks for the least loaded autobalanced chunk.
pub const AUTOBALANCE_CHUNK_ID: u32 = 0xFF;

const _: () = {
    assert!(MAX_RESERVED_REGIONS > 0);
    assert!((MAX_RESERVED_ID as u64) < 64, "chunk masks are 64 bits wide");
    assert!(AUTOBALANCE_CHUNK_ID > MAX_RESERVED_ID);
    assert!(MAX_SHARED_TOKENS_PER_DRIVER <= u32::MAX as usize);
};

/// Capacities of the allocator tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Accessors)]
pub struct Limits {
    max_regions: usize,
    max_region_size: u64,
    max_reserved_id: u32,
    max_tokens: usize,
    max_mapped_tokens: usize,
    max_allocations: usize,
}

impl Limits {
    pub const DEFAULT: Self = Self {
        max_regions: MAX_RESERVED_REGIONS,
        max_region_size: MAX_REGION_SIZE,
        max_reserved_id: MAX_RESERVED_ID,
        max_tokens: MAX_SHARED_TOKENS_PER_DRIVER,
        max_mapped_tokens: MAX_SHARED_TOKENS_PER_PROCESS,
        max_allocations: MAX_USER_ALLOCATIONS,
    };
}

impl Default for Limits {
    fn default() -> Self {
        Self::DEFAULT
    }
}
