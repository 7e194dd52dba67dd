//! Reference-counted virtual views of physical ranges.
//!
//! Several handles in one process may ask for the same range with the same
//! cache policy; they share one mapping. The mapper is called for the first
//! request only and the view is removed when the last user lets go.

use log::{debug, error};
use oal_alloc::{CachePolicy, MapSpace, OalError, PhysMapper, Result, SlotPool};
use oal_memory_addresses::{PhysicalAddress, VirtualAddress};
use oal_sync::SpinLock;

#[derive(Debug, Clone, Copy)]
struct View {
    phys: PhysicalAddress,
    size: u64,
    policy: CachePolicy,
    va: VirtualAddress,
    refs: usize,
}

impl View {
    fn is(&self, phys: PhysicalAddress, size: u64, policy: CachePolicy) -> bool {
        self.phys == phys && self.size == size && self.policy == policy
    }
}

pub struct VirtMemManager<M: PhysMapper> {
    mapper: M,
    views: SpinLock<SlotPool<View>>,
}

impl<M: PhysMapper> VirtMemManager<M> {
    #[must_use]
    pub fn new(mapper: M, capacity: usize) -> Self {
        Self {
            mapper,
            views: SpinLock::new(SlotPool::new(capacity)),
        }
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Number of distinct live views.
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.views.with_lock(|v| v.len())
    }

    fn acquire(
        &self,
        phys: PhysicalAddress,
        size: u64,
        policy: CachePolicy,
    ) -> Option<VirtualAddress> {
        self.views.with_lock(|views| {
            let slot = views.position(|v| v.is(phys, size, policy))?;
            let view = views.get_mut(slot)?;
            view.refs += 1;
            Some(view.va)
        })
    }

    /// A view of `[phys, phys + size)` with `policy`.
    ///
    /// # Errors
    /// [`OalError::Map`] if the mapper refuses, [`OalError::PoolFull`] if
    /// the view table is full.
    pub fn map(
        &self,
        phys: PhysicalAddress,
        size: u64,
        policy: CachePolicy,
    ) -> Result<VirtualAddress> {
        if let Some(va) = self.acquire(phys, size, policy) {
            return Ok(va);
        }

        let va = self
            .mapper
            .map(phys, size, MapSpace::User, policy)
            .inspect_err(|e| error!("Mapping {phys}+{size:#x} ({policy:?}) failed: {e}"))?;

        let inserted = self.views.with_lock(|views| {
            // Another thread may have mapped the same range meanwhile.
            if let Some(slot) = views.position(|v| v.is(phys, size, policy))
                && let Some(view) = views.get_mut(slot)
            {
                view.refs += 1;
                return Ok(Some(view.va));
            }
            views
                .insert(View {
                    phys,
                    size,
                    policy,
                    va,
                    refs: 1,
                })
                .map(|_| None)
        });

        match inserted {
            Ok(None) => {
                debug!("Mapped {phys}+{size:#x} at {va} ({policy:?})");
                Ok(va)
            }
            Ok(Some(existing)) => {
                self.mapper.unmap(va, size, MapSpace::User)?;
                Ok(existing)
            }
            Err(e) => {
                self.mapper.unmap(va, size, MapSpace::User)?;
                Err(e)
            }
        }
    }

    /// Drop one reference to the view at `va`, unmapping it with the last.
    ///
    /// # Errors
    /// [`OalError::NotMapped`] if `va` is not a live view, [`OalError::Map`]
    /// if the mapper cannot remove it. The view keeps its last reference
    /// then, so the call can be repeated.
    pub fn unmap(&self, va: VirtualAddress) -> Result<()> {
        let last = self.views.with_lock(|views| {
            let slot = views.position(|v| v.va == va).ok_or(OalError::NotMapped)?;
            let view = views.get_mut(slot).ok_or(OalError::NotMapped)?;
            view.refs -= 1;
            if view.refs == 0 {
                views.remove(slot).map(Some)
            } else {
                Ok(None)
            }
        })?;

        let Some(view) = last else {
            return Ok(());
        };
        if let Err(e) = self.mapper.unmap(view.va, view.size, MapSpace::User) {
            error!("Unmapping {} failed: {e}", view.va);
            self.views.with_lock(|views| views.insert(View { refs: 1, ..view }))?;
            return Err(e.into());
        }
        debug!("Unmapped {}+{:#x}", view.phys, view.size);
        Ok(())
    }
}
