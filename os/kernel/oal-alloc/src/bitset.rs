//! Fixed-capacity bit-per-slot map.
//!
//! Bits past `capacity` in the last word are never set, so word-level scans
//! only need a final bounds check.

use alloc::boxed::Box;
use alloc::vec;

const WORD_BITS: usize = u64::BITS as usize;

/// Mask of `len` bits starting at bit `lo` of a word.
#[inline]
const fn word_mask(lo: usize, len: usize) -> u64 {
    if len >= WORD_BITS {
        u64::MAX
    } else {
        ((1u64 << len) - 1) << lo
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Bitset {
    words: Box<[u64]>,
    capacity: usize,
}

impl Bitset {
    /// A bitset of `capacity` bits, all clear.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0u64; capacity.div_ceil(WORD_BITS)].into_boxed_slice(),
            capacity,
        }
    }

    /// Clear every bit.
    pub fn init(&mut self) {
        self.words.fill(0);
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub fn set_bit(&mut self, bit: usize) {
        assert!(bit < self.capacity, "bit {bit} out of range");
        self.words[bit / WORD_BITS] |= 1 << (bit % WORD_BITS);
    }

    #[inline]
    pub fn clear_bit(&mut self, bit: usize) {
        assert!(bit < self.capacity, "bit {bit} out of range");
        self.words[bit / WORD_BITS] &= !(1 << (bit % WORD_BITS));
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self, bit: usize) -> bool {
        assert!(bit < self.capacity, "bit {bit} out of range");
        self.words[bit / WORD_BITS] & (1 << (bit % WORD_BITS)) != 0
    }

    /// First clear bit, scanning from bit 0.
    #[inline]
    #[must_use]
    pub fn get_unused_bit(&self) -> Option<usize> {
        self.first_clear_from(0)
    }

    /// First clear bit at or after `start`.
    #[must_use]
    pub fn first_clear_from(&self, start: usize) -> Option<usize> {
        if start >= self.capacity {
            return None;
        }
        let first = start / WORD_BITS;
        for (i, &w) in self.words.iter().enumerate().skip(first) {
            let below = if i == first {
                word_mask(0, start % WORD_BITS)
            } else {
                0
            };
            let taken = w | below;
            if taken != u64::MAX {
                let bit = i * WORD_BITS + (!taken).trailing_zeros() as usize;
                return (bit < self.capacity).then_some(bit);
            }
        }
        None
    }

    /// First set bit in `[start, end)`.
    #[must_use]
    pub fn first_set_in(&self, start: usize, end: usize) -> Option<usize> {
        let end = end.min(self.capacity);
        let mut pos = start;
        while pos < end {
            let i = pos / WORD_BITS;
            let lo = pos % WORD_BITS;
            let len = (WORD_BITS - lo).min(end - pos);
            let hits = self.words[i] & word_mask(lo, len);
            if hits != 0 {
                return Some(i * WORD_BITS + hits.trailing_zeros() as usize);
            }
            pos += len;
        }
        None
    }

    /// Lowest start `>= from` of `count` contiguous clear bits.
    #[must_use]
    pub fn find_clear_run(&self, from: usize, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let mut pos = from;
        loop {
            let free = self.first_clear_from(pos)?;
            let end = free.checked_add(count)?;
            if end > self.capacity {
                return None;
            }
            match self.first_set_in(free, end) {
                None => return Some(free),
                Some(taken) => pos = taken + 1,
            }
        }
    }

    /// Whether every bit in `[start, start + count)` equals `set`.
    #[must_use]
    pub fn range_is(&self, start: usize, count: usize, set: bool) -> bool {
        let end = start + count;
        assert!(end <= self.capacity, "range {start}+{count} out of range");
        let mut pos = start;
        while pos < end {
            let i = pos / WORD_BITS;
            let lo = pos % WORD_BITS;
            let len = (WORD_BITS - lo).min(end - pos);
            let mask = word_mask(lo, len);
            let want = if set { mask } else { 0 };
            if self.words[i] & mask != want {
                return false;
            }
            pos += len;
        }
        true
    }

    /// Set or clear every bit in `[start, start + count)`, a word at a time.
    pub fn fill_range(&mut self, start: usize, count: usize, set: bool) {
        let end = start + count;
        assert!(end <= self.capacity, "range {start}+{count} out of range");
        let mut pos = start;
        while pos < end {
            let i = pos / WORD_BITS;
            let lo = pos % WORD_BITS;
            let len = (WORD_BITS - lo).min(end - pos);
            let mask = word_mask(lo, len);
            if set {
                self.words[i] |= mask;
            } else {
                self.words[i] &= !mask;
            }
            pos += len;
        }
    }

    #[must_use]
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count_set() == self.capacity
    }
}

impl core::fmt::Debug for Bitset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bitset")
            .field("capacity", &self.capacity)
            .field("used", &self.count_set())
            .finish()
    }
}
