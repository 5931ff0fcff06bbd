//! # Atlas Common
//!
//! Common types, utilities, and shared abstractions for Project Atlas.
//!
//! This crate provides foundational types used across all Atlas subsystems:
//! - Coordinate types (world, chunk, local) and the coordinate mapper
//! - Agent IDs
//! - Version information for on-disk schemas
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod version;

/// Largest chunk size a [`LocalCoord`] can address.
pub const MAX_CHUNK_SIZE: u32 = 4096;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coords_conversion() {
        let world = WorldCoord::new(100, 200);
        let chunk = world.to_chunk_coord(32);
        let local = world.to_local_coord(32);

        assert_eq!(chunk, ChunkCoord::new(3, 6));
        assert_eq!(local, LocalCoord::new(4, 8));
    }

    #[test]
    fn test_agent_id_display() {
        let id = AgentId::from("Isabella Rodriguez");
        assert_eq!(id.to_string(), "Isabella Rodriguez");
        assert_eq!(id, AgentId::new(String::from("Isabella Rodriguez")));
    }

    #[test]
    fn test_version_compatibility() {
        let newer_minor = SchemaVersion::new(1, 3);
        let next_major = SchemaVersion::new(2, 0);

        assert!(SchemaVersion::CHUNK_RECORD.can_read(&newer_minor));
        assert!(!SchemaVersion::CHUNK_RECORD.can_read(&next_major));
        assert_eq!(newer_minor.to_string(), "1.3");
    }
}
