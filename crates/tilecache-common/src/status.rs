//! Status codes for tile cache operations

/// Status enum for tile cache operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Status {
    /// Operation failed due to an unknown reason
    Failure,
    /// Provided parameter or reference was invalid
    InvalidParam,
    /// No free slot or the allocator refused a request
    OutOfMemory,
    /// A bounded queue or output buffer is full
    BufferTooSmall,
    /// Value already exists
    AlreadyExists,
    /// Input data is corrupted or truncated
    DataCorrupted,
    /// Data has wrong magic number
    WrongMagic,
    /// Data has wrong version
    WrongVersion,
}

impl Status {
    /// Checks if the status describes malformed tile data
    pub fn is_corrupt_data(&self) -> bool {
        matches!(
            self,
            Status::DataCorrupted | Status::WrongMagic | Status::WrongVersion
        )
    }
}

impl std::error::Error for Status {}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Failure => write!(f, "operation failed"),
            Status::InvalidParam => write!(f, "invalid parameter"),
            Status::OutOfMemory => write!(f, "out of memory"),
            Status::BufferTooSmall => write!(f, "buffer too small"),
            Status::AlreadyExists => write!(f, "already exists"),
            Status::DataCorrupted => write!(f, "data corrupted"),
            Status::WrongMagic => write!(f, "wrong magic number"),
            Status::WrongVersion => write!(f, "wrong version"),
        }
    }
}

impl From<std::io::Error> for Status {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Status::DataCorrupted,
            std::io::ErrorKind::OutOfMemory => Status::OutOfMemory,
            _ => Status::Failure,
        }
    }
}
