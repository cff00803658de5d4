//! Common utilities and error types shared by the tile cache crates

mod geometry;
mod math;
mod status;

pub use geometry::*;
pub use math::*;
pub use status::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("tile cache error: {0}")]
    TileCache(#[from] Status),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tile build failed: {0}")]
    Build(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl Error {
    /// Maps the error onto the status taxonomy used by the scheduler.
    ///
    /// Configuration problems are parameter errors, builder failures are
    /// generic failures and serialization problems count as corrupt data.
    pub fn status(&self) -> Status {
        match self {
            Error::TileCache(status) => *status,
            Error::InvalidConfig(_) => Status::InvalidParam,
            Error::Build(_) => Status::Failure,
            Error::Serialization(_) => Status::DataCorrupted,
        }
    }

    /// Checks if the operation may succeed when retried later
    pub fn is_transient(&self) -> bool {
        self.status() == Status::OutOfMemory
    }
}

/// Result type for tile cache operations
pub type Result<T> = std::result::Result<T, Error>;
