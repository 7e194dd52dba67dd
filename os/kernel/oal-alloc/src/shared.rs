//! Per-process view of shared-memory tokens.
//!
//! A process resolves a token through a [`TokenService`] (the driver, directly
//! or over a transport) and records each mapping it creates so that the
//! mapping can be removed again when the token is unmapped or released.

use crate::error::{OalError, Result};
use crate::mapper::{CachePolicy, MapSpace, PhysMapper};
use crate::slot_pool::SlotPool;
use crate::token::{Token, TokenInfo};
use log::error;
use oal_abi::MemoryAccess;
use oal_memory_addresses::{PhysicalAddress, VirtualAddress};
use oal_sync::SpinLock;

/// Resolves and releases tokens on behalf of a process.
pub trait TokenService {
    /// # Errors
    /// [`OalError::CorruptToken`] or [`OalError::Released`] for unusable tokens.
    fn token_info(&self, token: Token) -> Result<TokenInfo>;

    /// # Errors
    /// [`OalError::CorruptToken`] or [`OalError::Released`] for unusable tokens.
    fn release_token(&self, token: Token) -> Result<()>;
}

impl<T: TokenService + ?Sized> TokenService for &T {
    fn token_info(&self, token: Token) -> Result<TokenInfo> {
        (**self).token_info(token)
    }

    fn release_token(&self, token: Token) -> Result<()> {
        (**self).release_token(token)
    }
}

/// Address returned by [`TokenMappings::map_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedAddress {
    Physical(PhysicalAddress),
    Virtual(VirtualAddress),
}

impl MappedAddress {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        match self {
            Self::Physical(pa) => pa.as_u64(),
            Self::Virtual(va) => va.as_u64(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TokenMapping {
    token: Token,
    /// `None` while a map or unmap call is in flight.
    va: Option<VirtualAddress>,
    size: u64,
}

/// The tokens one process currently has mapped.
pub struct TokenMappings<M: PhysMapper> {
    mapper: M,
    table: SpinLock<SlotPool<TokenMapping>>,
}

impl<M: PhysMapper> TokenMappings<M> {
    #[must_use]
    pub fn new(mapper: M, capacity: usize) -> Self {
        Self {
            mapper,
            table: SpinLock::new(SlotPool::new(capacity)),
        }
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[must_use]
    pub fn is_mapped(&self, token: Token) -> bool {
        self.table
            .with_lock(|t| t.position(|m| m.token == token && m.va.is_some()).is_some())
    }

    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.table.with_lock(|t| t.len())
    }

    /// Make the memory behind `token` reachable with `access`.
    ///
    /// [`MemoryAccess::Physical`] only looks the token up and returns its
    /// physical address; nothing is recorded. Any other mode creates a user
    /// mapping, cacheable for write-back and non-cacheable otherwise.
    ///
    /// # Errors
    /// - Lookup failures of `service`.
    /// - [`OalError::AlreadyMapped`] if this process has the token mapped.
    /// - [`OalError::PoolFull`] if the mapping table is full.
    /// - [`OalError::Map`] if the mapper refuses; nothing is recorded then.
    pub fn map_token<S: TokenService + ?Sized>(
        &self,
        service: &S,
        token: Token,
        access: MemoryAccess,
    ) -> Result<MappedAddress> {
        let info = service.token_info(token)?;
        if !access.needs_mapping() {
            return Ok(MappedAddress::Physical(info.phys));
        }

        let slot = self.table.with_lock(|t| {
            if t.position(|m| m.token == token).is_some() {
                return Err(OalError::AlreadyMapped);
            }
            t.insert(TokenMapping {
                token,
                va: None,
                size: info.size,
            })
        })?;

        match self
            .mapper
            .map(info.phys, info.size, MapSpace::User, CachePolicy::from(access))
        {
            Ok(va) => {
                self.table.with_lock(|t| {
                    if let Some(m) = t.get_mut(slot) {
                        m.va = Some(va);
                    }
                });
                Ok(MappedAddress::Virtual(va))
            }
            Err(e) => {
                error!("Mapping {token:?} ({}+{:#x}) failed: {e}", info.phys, info.size);
                self.table.with_lock(|t| t.remove(slot))?;
                Err(e.into())
            }
        }
    }

    /// Remove this process' mapping of `token`.
    ///
    /// # Errors
    /// [`OalError::NotMapped`] if no mapping is recorded, [`OalError::Map`]
    /// if the mapper fails to remove it. The mapping stays recorded then.
    pub fn unmap_token(&self, token: Token) -> Result<()> {
        let (slot, va, size) = self.table.with_lock(|t| {
            let slot = t
                .position(|m| m.token == token && m.va.is_some())
                .ok_or(OalError::NotMapped)?;
            let mapping = t.get_mut(slot).ok_or(OalError::NotMapped)?;
            let va = mapping.va.take().ok_or(OalError::NotMapped)?;
            Ok::<_, OalError>((slot, va, mapping.size))
        })?;

        if let Err(e) = self.mapper.unmap(va, size, MapSpace::User) {
            error!("Unmapping {token:?} at {va} failed: {e}");
            self.table.with_lock(|t| {
                if let Some(m) = t.get_mut(slot) {
                    m.va = Some(va);
                }
            });
            return Err(e.into());
        }
        self.table.with_lock(|t| t.remove(slot))?;
        Ok(())
    }

    /// Release `token`, unmapping it first if this process still has it
    /// mapped.
    ///
    /// # Errors
    /// Unmap failures, then the release failures of `service`.
    pub fn release_token<S: TokenService + ?Sized>(&self, service: &S, token: Token) -> Result<()> {
        if self.is_mapped(token) {
            self.unmap_token(token)?;
        }
        service.release_token(token)
    }
}
