/// How a caller wants to reach an allocation or a shared token.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryAccess {
    /// No mapping; the physical address itself.
    Physical = 0,
    CacheableWriteBack = 1,
    CacheableWriteThrough = 2,
    NonCacheableBufferable = 3,
    NonCacheableNonBuffered = 4,
}

impl MemoryAccess {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Physical),
            1 => Some(Self::CacheableWriteBack),
            2 => Some(Self::CacheableWriteThrough),
            3 => Some(Self::NonCacheableBufferable),
            4 => Some(Self::NonCacheableNonBuffered),
            _ => None,
        }
    }

    /// Only write-back gets a cacheable view; every other mapped mode is
    /// served by the non-cacheable one.
    #[must_use]
    pub const fn is_cacheable(self) -> bool {
        matches!(self, Self::CacheableWriteBack)
    }

    #[must_use]
    pub const fn needs_mapping(self) -> bool {
        !matches!(self, Self::Physical)
    }
}
