//! # Shared-Memory Tokens
//!
//! A token names a `(physical address, size)` allocation without exposing the
//! address itself, so unrelated processes can agree on a buffer.
//!
//! Tokens are generational slot indices. The low 32 bits carry the slot and
//! the high 32 bits the slot's generation at creation; the packed value is
//! complemented before it leaves the table:
//!
//! ```text
//!   token = !((generation << 32) | slot)
//! ```
//!
//! A slot's generation is bumped every time it is reused, and generation 0 is
//! never issued. Decoding therefore tells apart a value that was never a
//! token (corrupt) from one whose slot has since been freed or reused
//! (released).

use crate::error::{OalError, Result};
use crate::slot_pool::SlotPool;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use log::{debug, error};
use oal_memory_addresses::PhysicalAddress;

/// Opaque shared-memory token.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    const fn pack(slot: u32, generation: u32) -> Self {
        Self(!(((generation as u64) << 32) | slot as u64))
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn unpack(self) -> (u32, u32) {
        let packed = !self.0;
        (packed as u32, (packed >> 32) as u32)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:#018x})", self.0)
    }
}

/// What a token stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub phys: PhysicalAddress,
    pub size: u64,
}

impl TokenInfo {
    /// Inclusive last byte; callers guarantee `size > 0` and no overflow.
    const fn last(&self) -> u64 {
        self.phys.as_u64() + (self.size - 1)
    }

    const fn overlaps(&self, other: &Self) -> bool {
        let lo = if self.phys.as_u64() > other.phys.as_u64() {
            self.phys.as_u64()
        } else {
            other.phys.as_u64()
        };
        let hi = if self.last() < other.last() {
            self.last()
        } else {
            other.last()
        };
        lo <= hi
    }
}

/// Table of live tokens. At most one live token covers any byte.
pub struct TokenTable {
    slots: SlotPool<TokenInfo>,
    generations: Vec<u32>,
}

impl TokenTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(u32::try_from(capacity).is_ok(), "token table too large");
        Self {
            slots: SlotPool::new(capacity),
            generations: vec![0; capacity],
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    #[must_use]
    pub fn live(&self) -> usize {
        self.slots.len()
    }

    /// Issue a token for `[phys, phys + size)`.
    ///
    /// # Errors
    /// - [`OalError::InvalidArgument`] for a zero size or a range that wraps.
    /// - [`OalError::Overlap`] if a live token covers any byte of the range.
    /// - [`OalError::PoolFull`] if every slot is live.
    pub fn create(&mut self, phys: PhysicalAddress, size: u64) -> Result<Token> {
        if size == 0 || phys.checked_add(size - 1).is_none() {
            return Err(OalError::InvalidArgument);
        }
        let info = TokenInfo { phys, size };
        if let Some((_, live)) = self.slots.iter().find(|(_, t)| t.overlaps(&info)) {
            error!(
                "Token range {phys}+{size:#x} overlaps live token {}+{:#x}",
                live.phys, live.size
            );
            return Err(OalError::Overlap);
        }

        let slot = self.slots.insert(info).inspect_err(|_| {
            error!("No free token slot for {phys}+{size:#x}");
        })?;
        let generation = &mut self.generations[slot];
        *generation = generation.wrapping_add(1).max(1);

        #[allow(clippy::cast_possible_truncation)]
        let token = Token::pack(slot as u32, *generation);
        debug!("Created {token:?} for {phys}+{size:#x}");
        Ok(token)
    }

    fn slot_of(&self, token: Token) -> Result<usize> {
        let (slot, generation) = token.unpack();
        let slot = slot as usize;
        let Some(&current) = self.generations.get(slot) else {
            return Err(OalError::CorruptToken);
        };
        if generation == 0 || generation > current {
            return Err(OalError::CorruptToken);
        }
        if generation != current || self.slots.get(slot).is_none() {
            return Err(OalError::Released);
        }
        Ok(slot)
    }

    /// # Errors
    /// [`OalError::CorruptToken`] for a value that was never issued,
    /// [`OalError::Released`] for a released token.
    pub fn get_info(&self, token: Token) -> Result<TokenInfo> {
        let slot = self.slot_of(token)?;
        self.slots.get(slot).copied().ok_or(OalError::Released)
    }

    /// # Errors
    /// See [`TokenTable::get_info`].
    pub fn release(&mut self, token: Token) -> Result<TokenInfo> {
        let slot = self.slot_of(token)?;
        let info = self.slots.remove(slot)?;
        debug!("Released {token:?}");
        Ok(info)
    }
}
