//! Index pool over a [`Bitset`]: a set bit means the slot is in use.

use crate::bitset::Bitset;
use crate::error::{OalError, Result};
use log::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPool {
    bits: Bitset,
}

impl StaticPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: Bitset::new(capacity),
        }
    }

    /// Mark every slot free.
    pub fn init(&mut self) {
        self.bits.init();
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.bits.capacity()
    }

    #[inline]
    #[must_use]
    pub const fn bits(&self) -> &Bitset {
        &self.bits
    }

    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.bits.count_set()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.bits.is_full()
    }

    #[inline]
    #[must_use]
    pub fn is_used(&self, index: usize) -> bool {
        index < self.capacity() && self.bits.is_set(index)
    }

    /// Claim the lowest free slot.
    ///
    /// # Errors
    /// [`OalError::PoolFull`] when every slot is taken.
    pub fn alloc_one(&mut self) -> Result<usize> {
        let index = self.bits.get_unused_bit().ok_or(OalError::PoolFull)?;
        self.bits.set_bit(index);
        Ok(index)
    }

    /// # Errors
    /// [`OalError::OutOfRange`] past capacity, [`OalError::DoubleFree`] if the
    /// slot was not in use.
    pub fn free_one(&mut self, index: usize) -> Result<()> {
        if index >= self.capacity() {
            error!("Releasing slot {index} beyond pool capacity {}", self.capacity());
            return Err(OalError::OutOfRange);
        }
        if !self.bits.is_set(index) {
            error!("Releasing slot {index} which is not in use");
            return Err(OalError::DoubleFree);
        }
        self.bits.clear_bit(index);
        Ok(())
    }

    /// Claim the lowest run of `count` free slots.
    ///
    /// # Errors
    /// [`OalError::InvalidArgument`] for `count == 0`, [`OalError::OutOfMemory`]
    /// if no run is long enough.
    pub fn alloc_range(&mut self, count: usize) -> Result<usize> {
        self.alloc_range_from(0, count)
    }

    /// Like [`StaticPool::alloc_range`] but only considers runs starting at
    /// or after `from`.
    ///
    /// # Errors
    /// See [`StaticPool::alloc_range`].
    pub fn alloc_range_from(&mut self, from: usize, count: usize) -> Result<usize> {
        if count == 0 {
            return Err(OalError::InvalidArgument);
        }
        let start = self
            .bits
            .find_clear_run(from, count)
            .ok_or(OalError::OutOfMemory)?;
        self.bits.fill_range(start, count, true);
        Ok(start)
    }

    /// Reserve exactly `[start, start + count)`.
    ///
    /// # Errors
    /// [`OalError::OutOfRange`] past capacity, [`OalError::Overlap`] if any
    /// slot in the range is already used.
    pub fn mark_used_range(&mut self, start: usize, count: usize) -> Result<()> {
        self.check_range(start, count)?;
        if !self.bits.range_is(start, count, false) {
            return Err(OalError::Overlap);
        }
        self.bits.fill_range(start, count, true);
        Ok(())
    }

    /// Release `[start, start + count)`. Nothing changes on failure.
    ///
    /// # Errors
    /// [`OalError::OutOfRange`] past capacity, [`OalError::DoubleFree`] if any
    /// slot in the range was free.
    pub fn free_range(&mut self, start: usize, count: usize) -> Result<()> {
        self.check_range(start, count)?;
        if !self.bits.range_is(start, count, true) {
            error!("Releasing {count} slots at {start}, some of which are not in use");
            return Err(OalError::DoubleFree);
        }
        self.bits.fill_range(start, count, false);
        Ok(())
    }

    /// The next maximal run of free slots starting at or after `start`, as
    /// `(first, len)`.
    #[must_use]
    pub fn get_next_unused_range(&self, start: usize) -> Option<(usize, usize)> {
        let first = self.bits.first_clear_from(start)?;
        let end = self
            .bits
            .first_set_in(first, self.capacity())
            .unwrap_or(self.capacity());
        Some((first, end - first))
    }

    /// The first maximal free run at or after `start` that is at least
    /// `count` long, as `(first, len)`.
    #[must_use]
    pub fn get_unused_range(&self, start: usize, count: usize) -> Option<(usize, usize)> {
        let mut pos = start;
        while let Some((first, len)) = self.get_next_unused_range(pos) {
            if len >= count {
                return Some((first, len));
            }
            pos = first + len;
        }
        None
    }

    fn check_range(&self, start: usize, count: usize) -> Result<()> {
        if count == 0 {
            return Err(OalError::InvalidArgument);
        }
        match start.checked_add(count) {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => Err(OalError::OutOfRange),
        }
    }
}
