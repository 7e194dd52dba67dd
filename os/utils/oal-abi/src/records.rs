use crate::{AllocFlags, Status};
use core::fmt;

/// Maximum bytes of a region name on the wire.
pub const REGION_NAME_LEN: usize = 30;

/// Fixed-size record exchanged over the command transport.
///
/// Encoding is little-endian at the `#[repr(C)]` field offsets, with padding
/// written as zero, so a decoded record re-encodes to the same bytes.
pub trait WireRecord: Sized {
    const SIZE: usize;

    /// Write into `out`, returning the number of bytes written.
    ///
    /// # Errors
    /// [`Status::BadMessage`] if `out` is shorter than [`Self::SIZE`].
    fn encode(&self, out: &mut [u8]) -> Result<usize, Status>;

    /// # Errors
    /// [`Status::BadMessage`] if `buf` is shorter than [`Self::SIZE`].
    fn decode(buf: &[u8]) -> Result<Self, Status>;
}

#[inline]
fn field<const N: usize>(buf: &[u8], off: usize) -> Result<[u8; N], Status> {
    let end = off.checked_add(N).ok_or(Status::BadMessage)?;
    let s = buf.get(off..end).ok_or(Status::BadMessage)?;
    let mut out = [0u8; N];
    out.copy_from_slice(s);
    Ok(out)
}

#[inline]
fn read_u64_le(buf: &[u8], off: usize) -> Result<u64, Status> {
    field::<8>(buf, off).map(u64::from_le_bytes)
}

#[inline]
fn read_u32_le(buf: &[u8], off: usize) -> Result<u32, Status> {
    field::<4>(buf, off).map(u32::from_le_bytes)
}

#[inline]
fn put(out: &mut [u8], off: usize, bytes: &[u8]) -> Result<(), Status> {
    let end = off.checked_add(bytes.len()).ok_or(Status::BadMessage)?;
    out.get_mut(off..end)
        .ok_or(Status::BadMessage)?
        .copy_from_slice(bytes);
    Ok(())
}

#[inline]
fn zeroed(out: &mut [u8], len: usize) -> Result<&mut [u8], Status> {
    let dst = out.get_mut(..len).ok_or(Status::BadMessage)?;
    dst.fill(0);
    Ok(dst)
}

/// Allocation request; the driver fills `phys`, rounds `size` and reports the
/// chunk alignment in `align`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocRequest {
    pub size: u64,
    pub align: u64,
    pub phys: u64,
    pub chunk_id: u8,
    pub flags: AllocFlags,
}

impl WireRecord for AllocRequest {
    const SIZE: usize = size_of::<Self>();

    fn encode(&self, out: &mut [u8]) -> Result<usize, Status> {
        let out = zeroed(out, Self::SIZE)?;
        put(out, 0, &self.size.to_le_bytes())?;
        put(out, 8, &self.align.to_le_bytes())?;
        put(out, 16, &self.phys.to_le_bytes())?;
        put(out, 24, &[self.chunk_id])?;
        put(out, 28, &self.flags.into_bits().to_le_bytes())?;
        Ok(Self::SIZE)
    }

    fn decode(buf: &[u8]) -> Result<Self, Status> {
        Ok(Self {
            size: read_u64_le(buf, 0)?,
            align: read_u64_le(buf, 8)?,
            phys: read_u64_le(buf, 16)?,
            chunk_id: field::<1>(buf, 24)?[0],
            flags: AllocFlags::from_bits(read_u32_le(buf, 28)?),
        })
    }
}

/// Release of a previously allocated physical range.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeRequest {
    pub phys: u64,
    pub size: u64,
}

impl WireRecord for FreeRequest {
    const SIZE: usize = size_of::<Self>();

    fn encode(&self, out: &mut [u8]) -> Result<usize, Status> {
        let out = zeroed(out, Self::SIZE)?;
        put(out, 0, &self.phys.to_le_bytes())?;
        put(out, 8, &self.size.to_le_bytes())?;
        Ok(Self::SIZE)
    }

    fn decode(buf: &[u8]) -> Result<Self, Status> {
        Ok(Self {
            phys: read_u64_le(buf, 0)?,
            size: read_u64_le(buf, 8)?,
        })
    }
}

/// Token create/lookup/release record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenRequest {
    pub phys: u64,
    pub size: u64,
    pub token: u64,
}

impl WireRecord for TokenRequest {
    const SIZE: usize = size_of::<Self>();

    fn encode(&self, out: &mut [u8]) -> Result<usize, Status> {
        let out = zeroed(out, Self::SIZE)?;
        put(out, 0, &self.phys.to_le_bytes())?;
        put(out, 8, &self.size.to_le_bytes())?;
        put(out, 16, &self.token.to_le_bytes())?;
        Ok(Self::SIZE)
    }

    fn decode(buf: &[u8]) -> Result<Self, Status> {
        Ok(Self {
            phys: read_u64_le(buf, 0)?,
            size: read_u64_le(buf, 8)?,
            token: read_u64_le(buf, 16)?,
        })
    }
}

/// NUL-padded region name, at most [`REGION_NAME_LEN`] bytes.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegionName([u8; REGION_NAME_LEN]);

impl RegionName {
    /// Build from a node name, dropping any `@unit-address` suffix and
    /// truncating to [`REGION_NAME_LEN`] bytes on a character boundary.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let name = name.split('@').next().unwrap_or_default();
        let mut len = name.len().min(REGION_NAME_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut raw = [0u8; REGION_NAME_LEN];
        raw[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self(raw)
    }

    #[must_use]
    pub const fn from_bytes(raw: [u8; REGION_NAME_LEN]) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; REGION_NAME_LEN] {
        &self.0
    }

    /// Text up to the first NUL; empty if the bytes are not UTF-8.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(REGION_NAME_LEN);
        core::str::from_utf8(&self.0[..len]).unwrap_or_default()
    }
}

impl fmt::Debug for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the [`Command::GetChunks`](crate::Command::GetChunks) reply.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservedRegion {
    pub name: RegionName,
    pub id: u32,
    pub start: u64,
    pub size: u64,
}

impl WireRecord for ReservedRegion {
    const SIZE: usize = size_of::<Self>();

    fn encode(&self, out: &mut [u8]) -> Result<usize, Status> {
        let out = zeroed(out, Self::SIZE)?;
        put(out, 0, self.name.as_bytes())?;
        put(out, 32, &self.id.to_le_bytes())?;
        put(out, 40, &self.start.to_le_bytes())?;
        put(out, 48, &self.size.to_le_bytes())?;
        Ok(Self::SIZE)
    }

    fn decode(buf: &[u8]) -> Result<Self, Status> {
        Ok(Self {
            name: RegionName::from_bytes(field::<REGION_NAME_LEN>(buf, 0)?),
            id: read_u32_le(buf, 32)?,
            start: read_u64_le(buf, 40)?,
            size: read_u64_le(buf, 48)?,
        })
    }
}

impl WireRecord for u64 {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) -> Result<usize, Status> {
        put(out, 0, &self.to_le_bytes())?;
        Ok(Self::SIZE)
    }

    fn decode(buf: &[u8]) -> Result<Self, Status> {
        read_u64_le(buf, 0)
    }
}

impl WireRecord for u8 {
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) -> Result<usize, Status> {
        put(out, 0, &[*self])?;
        Ok(Self::SIZE)
    }

    fn decode(buf: &[u8]) -> Result<Self, Status> {
        field::<1>(buf, 0).map(|b| b[0])
    }
}

const _: () = {
    assert!(size_of::<AllocRequest>() == 32);
    assert!(size_of::<FreeRequest>() == 16);
    assert!(size_of::<TokenRequest>() == 24);
    assert!(size_of::<ReservedRegion>() == 56);
    assert!(core::mem::offset_of!(ReservedRegion, id) == 32);
    assert!(core::mem::offset_of!(ReservedRegion, start) == 40);
    assert!(core::mem::offset_of!(AllocRequest, flags) == 28);
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::CHUNK_ID_DDR1;

    #[test]
    fn alloc_request_layout() {
        let req = AllocRequest {
            size: 0x4000,
            align: 0x1000,
            phys: 0x1000_0000,
            chunk_id: CHUNK_ID_DDR1,
            flags: AllocFlags::for_chunk(CHUNK_ID_DDR1),
        };
        let mut buf = [0xAAu8; AllocRequest::SIZE];
        assert_eq!(req.encode(&mut buf), Ok(32));
        assert_eq!(&buf[0..8], &0x4000u64.to_le_bytes());
        assert_eq!(&buf[16..24], &0x1000_0000u64.to_le_bytes());
        assert_eq!(buf[24], CHUNK_ID_DDR1);
        assert_eq!(&buf[25..28], &[0, 0, 0]);
        assert_eq!(&buf[28..32], &0x0200_0001u32.to_le_bytes());
        assert_eq!(AllocRequest::decode(&buf), Ok(req));
    }

    #[test]
    fn reserved_region_bytes_survive_decode_encode() {
        let region = ReservedRegion {
            name: RegionName::new("sram@34000000"),
            id: 3,
            start: 0x3400_0000,
            size: 0x40_0000,
        };
        let mut first = [0u8; ReservedRegion::SIZE];
        region.encode(&mut first).unwrap();

        let decoded = ReservedRegion::decode(&first).unwrap();
        assert_eq!(decoded.name.as_str(), "sram");

        let mut second = [0xFFu8; ReservedRegion::SIZE];
        decoded.encode(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert_eq!(TokenRequest::decode(&[0u8; 23]), Err(Status::BadMessage));
        let mut out = [0u8; 15];
        assert_eq!(
            FreeRequest { phys: 1, size: 2 }.encode(&mut out),
            Err(Status::BadMessage)
        );
    }

    #[test]
    fn region_name_truncates() {
        let long = "a-very-long-reserved-memory-region-name";
        assert_eq!(RegionName::new(long).as_str().len(), REGION_NAME_LEN);
        assert_eq!(RegionName::new("ddr0").as_str(), "ddr0");
        assert_eq!(RegionName::new("").as_str(), "");
    }
}
