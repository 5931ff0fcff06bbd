//! Format identifiers stamped into chunk records and map exports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `major.minor` version of a persisted or exported format.
///
/// Minor bumps only add optional data, so any reader accepts records with
/// its own major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Incompatible layout changes
    pub major: u16,
    /// Additive changes
    pub minor: u16,
}

impl SchemaVersion {
    /// Chunk records written by this build.
    pub const CHUNK_RECORD: Self = Self::new(1, 0);

    /// Map exports written by this build.
    pub const MAP_EXPORT: Self = Self::new(1, 0);

    /// Creates a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Whether data stamped with `data_version` can be decoded.
    #[must_use]
    pub const fn can_read(&self, data_version: &Self) -> bool {
        self.major == data_version.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Leading bytes identifying a binary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicBytes(pub [u8; 4]);

impl MagicBytes {
    /// Binary chunk record.
    pub const CHUNK: Self = Self(*b"ATCH");
}
