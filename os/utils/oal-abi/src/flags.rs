use bitfield_struct::bitfield;

/// Chunk id meaning "let the driver choose".
pub const CHUNK_ID_AUTO: u8 = 0;
pub const CHUNK_ID_DDR0: u8 = 1;
pub const CHUNK_ID_DDR1: u8 = 2;
pub const CHUNK_ID_SRAM_SINGLE: u8 = 3;
pub const CHUNK_ID_SRAM_MULTI: u8 = 4;
pub const CHUNK_ID_CB_RAM: u8 = 5;
pub const CHUNK_ID_EXTENSION: u8 = 6;

/// Flags word of an allocation request.
///
/// The top byte selects the destination chunk; [`CHUNK_ID_AUTO`] leaves the
/// choice to the driver.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct AllocFlags {
    /// Bit 0: physically contiguous (always honoured).
    pub contiguous: bool,

    /// Bit 1: must not be swapped out.
    pub non_swappable: bool,

    /// Bit 2: zero the allocation before returning it.
    pub zero: bool,

    /// Bit 3: honour one of the alignment bits below.
    pub aligned: bool,

    /// Bits 4–7: Reserved.
    #[bits(4)]
    pub reserved0: u8,

    /// Bit 8: align to a cache line.
    pub align_cacheline: bool,

    /// Bit 9: align to a page.
    pub align_page: bool,

    /// Bit 10: align to `2^align_shift` bytes.
    pub align_bytes: bool,

    /// Bits 11–15: Reserved.
    #[bits(5)]
    pub reserved1: u8,

    /// Bits 16–23: alignment exponent for [`AllocFlags::align_bytes`].
    pub align_shift: u8,

    /// Bits 24–31: destination chunk id.
    pub chunk_id: u8,
}

impl AllocFlags {
    /// Flags for a plain contiguous allocation from `chunk_id`.
    #[must_use]
    pub const fn for_chunk(chunk_id: u8) -> Self {
        Self::new().with_contiguous(true).with_chunk_id(chunk_id)
    }
}
