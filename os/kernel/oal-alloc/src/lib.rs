//! # Physical Memory Pool Manager
//!
//! Hands out page-granular allocations from a small set of reserved physical
//! regions (DDR carve-outs, on-chip SRAM) and lets processes share those
//! allocations through opaque tokens.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Memory Allocator context               │
//! │    • One lock per table                             │
//! │    • Region registration and zero-initialization    │
//! │    • Token service for processes                    │
//! └────────────┬───────────────────────┬────────────────┘
//!              │                       │
//! ┌────────────▼────────────┐ ┌────────▼────────────────┐
//! │      Page Manager       │ │      Token Table        │
//! │  • Chunk per region     │ │  • Generational slots   │
//! │  • Lookup by id/address │ │  • No overlapping ranges│
//! └────────────┬────────────┘ └────────┬────────────────┘
//!              │                       │
//! ┌────────────▼───────────────────────▼────────────────┐
//! │              Static Pool over a Bitset              │
//! │    • Fixed capacity, sized once from [`Limits`]     │
//! │    • Single slots and contiguous runs               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Collaborators
//!
//! Two traits keep the platform out of this crate:
//!
//! * [`PhysBaseResolver`] turns a region's configured address into the base
//!   that allocations are computed from.
//! * [`PhysMapper`] creates and removes virtual views of physical ranges,
//!   used for zeroing regions and for mapping shared tokens.
//!
//! ## Example
//!
//! ```rust
//! use oal_alloc::{MemoryAllocator, RegionDescriptor};
//! use oal_memory_addresses::PhysicalAddress;
//!
//! # struct NoMapper;
//! # unsafe impl oal_alloc::PhysMapper for NoMapper {
//! #     fn map(&self, _: PhysicalAddress, _: u64, _: oal_alloc::MapSpace, _: oal_alloc::CachePolicy)
//! #         -> Result<oal_memory_addresses::VirtualAddress, oal_alloc::MapError> {
//! #         Err(oal_alloc::MapError::Rejected)
//! #     }
//! #     fn unmap(&self, _: oal_memory_addresses::VirtualAddress, _: u64, _: oal_alloc::MapSpace)
//! #         -> Result<(), oal_alloc::MapError> { Ok(()) }
//! # }
//! let allocator = MemoryAllocator::new();
//! let region = RegionDescriptor::new("ddr", PhysicalAddress::new(0x1000_0000), 0x10000, 1);
//! allocator.add_reserved_memory_region(region, &NoMapper).unwrap();
//!
//! let a = allocator.alloc(1, 0x4000).unwrap();
//! assert_eq!(a.phys, PhysicalAddress::new(0x1000_0000));
//! allocator.free(a.phys, a.size).unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod allocator;
pub mod bitset;
mod chunk;
mod error;
pub mod limits;
mod mapper;
mod page_manager;
mod phys_base;
mod region;
mod shared;
mod slot_pool;
pub mod static_pool;
mod token;

pub use allocator::{Allocation, MemoryAllocator};
pub use bitset::Bitset;
pub use chunk::MemoryChunk;
pub use error::{MapError, OalError, Result};
pub use limits::Limits;
pub use mapper::{CachePolicy, MapSpace, PhysMapper, zero_physical};
pub use page_manager::{ChunkHandle, PageManager, PageRange};
pub use phys_base::{IdentityBase, OffsetBase, PhysBaseResolver};
pub use region::RegionDescriptor;
pub use shared::{MappedAddress, TokenMappings, TokenService};
pub use slot_pool::SlotPool;
pub use static_pool::StaticPool;
pub use token::{Token, TokenInfo, TokenTable};
