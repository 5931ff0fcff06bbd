//! # Atlas World
//!
//! Infinite world management for Project Atlas.
//!
//! This crate handles:
//! - Procedural terrain generation from seeded noise channels
//! - Chunk caching with LRU eviction and disk persistence
//! - Active regions around tracked agents
//! - Bounded A* pathfinding and spawn allocation
//! - Hierarchical tile addresses and map export

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod address;
pub mod chunk;
pub mod config;
pub mod export;
pub mod generation;
pub mod pathfinding;
pub mod persist;
pub mod region;
pub mod spawn;
pub mod store;
pub mod tile;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::address::*;
    pub use crate::chunk::*;
    pub use crate::config::*;
    pub use crate::export::*;
    pub use crate::generation::*;
    pub use crate::pathfinding::*;
    pub use crate::persist::*;
    pub use crate::region::*;
    pub use crate::spawn::*;
    pub use crate::store::*;
    pub use crate::tile::*;
    pub use crate::world::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_common::{ChunkCoord, WorldCoord};
    use tempfile::TempDir;

    #[test]
    fn test_chunk_creation() {
        let generator = TerrainGenerator::with_seed(1);
        let coord = ChunkCoord::new(0, 0);
        let chunk = generator.generate_chunk(coord);
        assert_eq!(chunk.coord(), coord);
        assert_eq!(chunk.tiles().len(), 32 * 32);
        assert!(!chunk.is_dirty());
        assert!(chunk.is_generated());
    }

    #[test]
    fn test_chunk_serialization() {
        let generator = TerrainGenerator::with_seed(2);
        let coord = ChunkCoord::new(1, 2);
        let chunk = generator.generate_chunk(coord);
        let bytes = chunk.serialize().expect("serialize failed");
        let loaded =
            Chunk::deserialize(&bytes, coord, generator.mapper()).expect("deserialize failed");
        assert_eq!(loaded.coord(), coord);
    }

    #[test]
    fn test_world_round_trip_through_prelude() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let world = InfiniteWorld::new(WorldConfig {
            chunk_size: 8,
            initial_preload_radius: 0,
            save_dir: dir.path().to_path_buf(),
            ..WorldConfig::default()
        })
        .expect("valid world config");
        assert_eq!(world.store().resident_count(), 1);
        assert_eq!(world.tile_at(WorldCoord::new(-1, -1)).coord, WorldCoord::new(-1, -1));
    }
}
