use oal_abi::Status;

/// Failure reported by the mapping collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("no virtual address space left")]
    NoAddressSpace,
    #[error("physical range cannot be mapped")]
    Rejected,
    #[error("address is not mapped")]
    NotMapped,
}

/// Error kinds of the pool manager and the token layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OalError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("no such chunk or address range")]
    NotFound,
    #[error("pool full")]
    PoolFull,
    #[error("out of memory")]
    OutOfMemory,
    #[error("range overlaps a live token")]
    Overlap,
    #[error("corrupt token")]
    CorruptToken,
    #[error("token already released")]
    Released,
    #[error("token not mapped")]
    NotMapped,
    #[error("token already mapped")]
    AlreadyMapped,
    #[error("region table full")]
    TooManyRegions,
    #[error("invalid region descriptor")]
    InvalidRegion,
    #[error("range was not allocated")]
    DoubleFree,
    #[error("index past pool capacity")]
    OutOfRange,
    #[error("mapping failed: {0}")]
    Map(#[from] MapError),
    #[error("unsupported operation")]
    Unsupported,
    #[error("malformed command payload")]
    Transport,
}

impl From<OalError> for Status {
    fn from(value: OalError) -> Self {
        match value {
            OalError::InvalidArgument => Self::InvalidArgument,
            OalError::NotFound => Self::NotFound,
            OalError::PoolFull => Self::PoolFull,
            OalError::OutOfMemory => Self::OutOfMemory,
            OalError::Overlap => Self::Overlap,
            OalError::CorruptToken => Self::CorruptToken,
            OalError::Released => Self::Released,
            OalError::NotMapped => Self::NotMapped,
            OalError::AlreadyMapped => Self::AlreadyMapped,
            OalError::TooManyRegions => Self::TooManyRegions,
            OalError::InvalidRegion => Self::InvalidRegion,
            OalError::DoubleFree => Self::DoubleFree,
            OalError::OutOfRange => Self::OutOfRange,
            OalError::Map(_) => Self::MapFailed,
            OalError::Unsupported => Self::Unsupported,
            OalError::Transport => Self::BadMessage,
        }
    }
}

impl From<Status> for OalError {
    fn from(value: Status) -> Self {
        match value {
            Status::InvalidArgument => Self::InvalidArgument,
            Status::NotFound => Self::NotFound,
            Status::PoolFull => Self::PoolFull,
            Status::OutOfMemory => Self::OutOfMemory,
            Status::Overlap => Self::Overlap,
            Status::CorruptToken => Self::CorruptToken,
            Status::Released => Self::Released,
            Status::NotMapped => Self::NotMapped,
            Status::AlreadyMapped => Self::AlreadyMapped,
            Status::TooManyRegions => Self::TooManyRegions,
            Status::InvalidRegion => Self::InvalidRegion,
            Status::DoubleFree => Self::DoubleFree,
            Status::OutOfRange => Self::OutOfRange,
            Status::MapFailed => Self::Map(MapError::Rejected),
            Status::Unsupported => Self::Unsupported,
            Status::BadMessage => Self::Transport,
        }
    }
}

pub type Result<T, E = OalError> = core::result::Result<T, E>;
