//! Typed fixed-capacity table: a [`StaticPool`] of liveness bits with a
//! parallel element array.

use crate::error::{OalError, Result};
use crate::static_pool::StaticPool;
use alloc::boxed::Box;
use alloc::vec::Vec;

pub struct SlotPool<T> {
    live: StaticPool,
    slots: Box<[Option<T>]>,
}

impl<T> SlotPool<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            live: StaticPool::new(capacity),
            slots: slots.into_boxed_slice(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.live.capacity()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.used()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.live.is_full()
    }

    /// Store `value` in the lowest free slot and return its index.
    ///
    /// # Errors
    /// [`OalError::PoolFull`] when every slot is taken.
    pub fn insert(&mut self, value: T) -> Result<usize> {
        let index = self.live.alloc_one()?;
        self.slots[index] = Some(value);
        Ok(index)
    }

    /// # Errors
    /// [`OalError::OutOfRange`] past capacity, [`OalError::DoubleFree`] if the
    /// slot is empty.
    pub fn remove(&mut self, index: usize) -> Result<T> {
        self.live.free_one(index)?;
        self.slots[index].take().ok_or(OalError::DoubleFree)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Live `(index, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }

    /// Index of the first live element matching `pred`.
    pub fn position(&self, mut pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.iter().find(|(_, v)| pred(v)).map(|(i, _)| i)
    }
}
