/// Failure code carried back over the command transport.
///
/// There is one code per allocator error kind so the client can reconstruct
/// the exact failure. [`Status::errno`] collapses it for transports that can
/// only carry a POSIX error number.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Status {
    #[error("invalid argument")]
    InvalidArgument = 1,
    #[error("not found")]
    NotFound = 2,
    #[error("pool full")]
    PoolFull = 3,
    #[error("out of memory")]
    OutOfMemory = 4,
    #[error("overlapping range")]
    Overlap = 5,
    #[error("corrupt token")]
    CorruptToken = 6,
    #[error("token released")]
    Released = 7,
    #[error("not mapped")]
    NotMapped = 8,
    #[error("already mapped")]
    AlreadyMapped = 9,
    #[error("too many regions")]
    TooManyRegions = 10,
    #[error("invalid region")]
    InvalidRegion = 11,
    #[error("double free")]
    DoubleFree = 12,
    #[error("out of range")]
    OutOfRange = 13,
    #[error("mapping failed")]
    MapFailed = 14,
    #[error("unsupported command")]
    Unsupported = 15,
    #[error("malformed message")]
    BadMessage = 16,
}

const EINVAL: i32 = 22;
const ENODEV: i32 = 19;
const ENOMEM: i32 = 12;
const EACCES: i32 = 13;
const EEXIST: i32 = 17;
const ENXIO: i32 = 6;
const EFAULT: i32 = 14;
const EBADMSG: i32 = 74;
const ENOTSUP: i32 = 95;

impl Status {
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::InvalidArgument,
            2 => Self::NotFound,
            3 => Self::PoolFull,
            4 => Self::OutOfMemory,
            5 => Self::Overlap,
            6 => Self::CorruptToken,
            7 => Self::Released,
            8 => Self::NotMapped,
            9 => Self::AlreadyMapped,
            10 => Self::TooManyRegions,
            11 => Self::InvalidRegion,
            12 => Self::DoubleFree,
            13 => Self::OutOfRange,
            14 => Self::MapFailed,
            15 => Self::Unsupported,
            16 => Self::BadMessage,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Positive POSIX error number for errno-only transports.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument
            | Self::CorruptToken
            | Self::Released
            | Self::InvalidRegion
            | Self::DoubleFree
            | Self::OutOfRange => EINVAL,
            Self::NotFound => ENODEV,
            Self::PoolFull | Self::OutOfMemory | Self::TooManyRegions => ENOMEM,
            Self::Overlap => EACCES,
            Self::NotMapped => ENXIO,
            Self::AlreadyMapped => EEXIST,
            Self::MapFailed => EFAULT,
            Self::Unsupported => ENOTSUP,
            Self::BadMessage => EBADMSG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 1..=16 {
            let s = Status::from_code(code).expect("every code in range is assigned");
            assert_eq!(s.code(), code);
        }
        assert_eq!(Status::from_code(0), None);
        assert_eq!(Status::from_code(17), None);
    }

    #[test]
    fn errno_collapses_related_kinds() {
        assert_eq!(Status::Overlap.errno(), 13);
        assert_eq!(Status::PoolFull.errno(), 12);
        assert_eq!(Status::CorruptToken.errno(), 22);
    }
}
