//! # Physical and Virtual Address Types
//!
//! Strongly typed wrappers for the addresses that flow through the memory
//! pool manager, plus page rounding helpers parameterized by [`PageSize`].
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | Bus/physical address of reserved DRAM or SRAM. |
//! | [`VirtualAddress`] | Address of a view created by a mapping collaborator. |
//!
//! Page sizes are marker types ([`Size4K`], [`Size16K`], [`Size64K`]). All
//! rounding helpers are `const fn`.
//!
//! ```rust
//! # use oal_memory_addresses::*;
//! assert_eq!(page_count::<Size4K>(0x4000), 4);
//! assert_eq!(page_count::<Size4K>(0x4001), 5);
//! assert_eq!(align_up::<Size4K>(0x1001), Some(0x2000));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod virtual_address;

pub use page_size::{PageSize, Size4K, Size16K, Size64K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Number of `S` pages needed to cover `bytes` (rounds up).
#[inline]
#[must_use]
pub const fn page_count<S: PageSize>(bytes: u64) -> u64 {
    (bytes >> S::SHIFT) + ((bytes & (S::SIZE - 1) != 0) as u64)
}

/// Number of whole `S` pages contained in `bytes` (rounds down).
#[inline]
#[must_use]
pub const fn whole_pages<S: PageSize>(bytes: u64) -> u64 {
    bytes >> S::SHIFT
}

/// Byte size of `pages` pages of size `S`.
#[inline]
#[must_use]
pub const fn pages_to_bytes<S: PageSize>(pages: u64) -> u64 {
    pages << S::SHIFT
}

/// Round `bytes` up to the next multiple of `S::SIZE`; `None` on overflow.
#[inline]
#[must_use]
pub const fn align_up<S: PageSize>(bytes: u64) -> Option<u64> {
    match bytes.checked_add(S::SIZE - 1) {
        Some(v) => Some(v & !(S::SIZE - 1)),
        None => None,
    }
}

#[inline]
#[must_use]
pub const fn is_page_aligned<S: PageSize>(bytes: u64) -> bool {
    bytes & (S::SIZE - 1) == 0
}
