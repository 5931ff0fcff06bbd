//! Error types for Project Atlas.

use thiserror::Error;

/// Configuration errors. These are the only fatal conditions of the world engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Chunk size was zero
    #[error("chunk size must be positive")]
    NonPositiveChunkSize,

    /// Chunk size exceeds what a local coordinate can address
    #[error("chunk size {0} exceeds the maximum of {}", crate::MAX_CHUNK_SIZE)]
    ChunkSizeTooLarge(u32),

    /// Cache capacity was zero
    #[error("max_loaded_chunks must be positive")]
    NonPositiveCapacity,

    /// Active region neighborhood must be a positive odd width
    #[error("active region size must be a positive odd number, got {0}")]
    InvalidRegionSize(u32),

    /// A value that must be positive was zero
    #[error("{0} must be positive")]
    NonPositive(&'static str),

    /// Configuration text could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// World and chunk errors. Unreadable records are cache misses, so loading
/// has no error of its own.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Chunk save failed
    #[error("Failed to save chunk: {0}")]
    SaveFailed(String),

    /// Invalid chunk data
    #[error("Invalid chunk data: {0}")]
    InvalidData(String),

    /// Map export failed
    #[error("Failed to export map: {0}")]
    ExportFailed(String),
}

/// Result type alias for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
