//! Coordinate types for world, chunk, and local positions.
//!
//! All conversions use Euclidean (floor) division so that negative world
//! coordinates land in the chunk to their lower-left and always resolve to a
//! non-negative local offset.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;
use crate::MAX_CHUNK_SIZE;

/// World coordinate in tiles (global position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldCoord {
    /// X coordinate in world space
    pub x: i64,
    /// Y coordinate in world space
    pub y: i64,
}

impl WorldCoord {
    /// Creates a new world coordinate.
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Converts to chunk coordinate given chunk size.
    #[must_use]
    pub const fn to_chunk_coord(self, chunk_size: u32) -> ChunkCoord {
        let size = chunk_size as i64;
        ChunkCoord {
            x: self.x.div_euclid(size) as i32,
            y: self.y.div_euclid(size) as i32,
        }
    }

    /// Converts to local coordinate within a chunk.
    #[must_use]
    pub const fn to_local_coord(self, chunk_size: u32) -> LocalCoord {
        let size = chunk_size as i64;
        LocalCoord {
            x: self.x.rem_euclid(size) as u16,
            y: self.y.rem_euclid(size) as u16,
        }
    }

    /// Returns this coordinate shifted by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i64, dy: i64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Manhattan (L1) distance to another coordinate.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u64 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Euclidean distance to another coordinate.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        dx.hypot(dy)
    }

    /// The four orthogonal neighbors, in a fixed order (N, E, S, W).
    #[must_use]
    pub const fn neighbors4(self) -> [Self; 4] {
        [
            self.offset(0, -1),
            self.offset(1, 0),
            self.offset(0, 1),
            self.offset(-1, 0),
        ]
    }
}

impl From<(i64, i64)> for WorldCoord {
    fn from((x, y): (i64, i64)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for WorldCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// X coordinate in chunk space
    pub x: i32,
    /// Y coordinate in chunk space
    pub y: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Converts to world coordinate (top-left corner of chunk).
    #[must_use]
    pub const fn to_world_coord(self, chunk_size: u32) -> WorldCoord {
        WorldCoord {
            x: (self.x as i64) * (chunk_size as i64),
            y: (self.y as i64) * (chunk_size as i64),
        }
    }

    /// Returns this coordinate shifted by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev (ring) distance to another chunk.
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy {
            dx
        } else {
            dy
        }
    }

    /// Manhattan distance to another chunk.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// All chunks in the square of the given radius around `self`, row by row.
    pub fn square(self, radius: u32) -> impl Iterator<Item = Self> {
        let r = radius as i32;
        (-r..=r).flat_map(move |dy| (-r..=r).map(move |dx| self.offset(dx, dy)))
    }
}

impl From<(i32, i32)> for ChunkCoord {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// Local coordinate within a chunk (0 to chunk_size-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalCoord {
    /// X coordinate within chunk
    pub x: u16,
    /// Y coordinate within chunk
    pub y: u16,
}

impl LocalCoord {
    /// Creates a new local coordinate.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Converts to linear index for array access.
    #[must_use]
    pub const fn to_index(self, chunk_size: u32) -> usize {
        (self.y as usize) * (chunk_size as usize) + (self.x as usize)
    }

    /// Creates from linear index.
    #[must_use]
    pub const fn from_index(index: usize, chunk_size: u32) -> Self {
        let size = chunk_size as usize;
        Self {
            x: (index % size) as u16,
            y: (index / size) as u16,
        }
    }
}

/// Stateless mapping between world, chunk and local space for a fixed chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateMapper {
    chunk_size: u32,
}

impl CoordinateMapper {
    /// Creates a mapper for a chunk size known to be valid.
    ///
    /// # Panics
    /// If `chunk_size` is zero or above [`MAX_CHUNK_SIZE`]. Use
    /// [`CoordinateMapper::try_new`] for sizes read from configuration.
    #[must_use]
    pub const fn new(chunk_size: u32) -> Self {
        assert!(
            chunk_size > 0 && chunk_size <= MAX_CHUNK_SIZE,
            "chunk size out of range"
        );
        Self { chunk_size }
    }

    /// Creates a mapper, rejecting a zero or oversized chunk size.
    pub const fn try_new(chunk_size: u32) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::NonPositiveChunkSize);
        }
        if chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ChunkSizeTooLarge(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    /// Chunk size in tiles.
    #[must_use]
    pub const fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Chunk containing the world coordinate.
    #[must_use]
    pub const fn world_to_chunk(&self, world: WorldCoord) -> ChunkCoord {
        world.to_chunk_coord(self.chunk_size)
    }

    /// Offset of the world coordinate inside its chunk.
    #[must_use]
    pub const fn world_to_local(&self, world: WorldCoord) -> LocalCoord {
        world.to_local_coord(self.chunk_size)
    }

    /// World coordinate of the chunk origin (top-left tile).
    #[must_use]
    pub const fn chunk_to_world(&self, chunk: ChunkCoord) -> WorldCoord {
        chunk.to_world_coord(self.chunk_size)
    }

    /// World coordinate of a local offset within a chunk.
    #[must_use]
    pub const fn local_to_world(&self, chunk: ChunkCoord, local: LocalCoord) -> WorldCoord {
        let origin = self.chunk_to_world(chunk);
        origin.offset(local.x as i64, local.y as i64)
    }

    /// Splits a world coordinate into its chunk and local parts.
    #[must_use]
    pub const fn split(&self, world: WorldCoord) -> (ChunkCoord, LocalCoord) {
        (self.world_to_chunk(world), self.world_to_local(world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_negative_coordinates_floor() {
        let mapper = CoordinateMapper::new(32);
        let world = WorldCoord::new(-5, -5);
        assert_eq!(mapper.world_to_chunk(world), ChunkCoord::new(-1, -1));
        assert_eq!(mapper.world_to_local(world), LocalCoord::new(27, 27));
    }

    #[test]
    fn test_mapper_size_checked() {
        assert_eq!(CoordinateMapper::try_new(0), Err(ConfigError::NonPositiveChunkSize));
        assert_eq!(
            CoordinateMapper::try_new(MAX_CHUNK_SIZE + 1),
            Err(ConfigError::ChunkSizeTooLarge(MAX_CHUNK_SIZE + 1))
        );
        assert_eq!(
            CoordinateMapper::try_new(MAX_CHUNK_SIZE).map(|m| m.chunk_size()),
            Ok(MAX_CHUNK_SIZE)
        );
    }

    #[test]
    fn test_chunk_boundaries() {
        let mapper = CoordinateMapper::new(32);
        assert_eq!(mapper.world_to_chunk(WorldCoord::new(-1, 0)), ChunkCoord::new(-1, 0));
        assert_eq!(mapper.world_to_chunk(WorldCoord::new(-32, 31)), ChunkCoord::new(-1, 0));
        assert_eq!(mapper.world_to_chunk(WorldCoord::new(-33, 32)), ChunkCoord::new(-2, 1));
        assert_eq!(mapper.world_to_local(WorldCoord::new(-32, -1)), LocalCoord::new(0, 31));
    }

    #[test]
    fn test_local_index_roundtrip() {
        let local = LocalCoord::new(7, 3);
        let index = local.to_index(16);
        assert_eq!(index, 55);
        assert_eq!(LocalCoord::from_index(index, 16), local);
    }

    #[test]
    fn test_square_iteration_order() {
        let cells: Vec<_> = ChunkCoord::new(0, 0).square(1).collect();
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[0], ChunkCoord::new(-1, -1));
        assert_eq!(cells[4], ChunkCoord::new(0, 0));
        assert_eq!(cells[8], ChunkCoord::new(1, 1));
    }

    #[test]
    fn test_distances() {
        let a = WorldCoord::new(0, 0);
        let b = WorldCoord::new(-3, 4);
        assert_eq!(a.manhattan(b), 7);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert_eq!(ChunkCoord::new(2, -3).chebyshev(ChunkCoord::new(-1, 1)), 4);
    }

    proptest! {
        #[test]
        fn prop_world_roundtrip(
            x in -1_000_000i64..1_000_000,
            y in -1_000_000i64..1_000_000,
            size in 1u32..512,
        ) {
            let mapper = CoordinateMapper::new(size);
            let world = WorldCoord::new(x, y);
            let (chunk, local) = mapper.split(world);
            prop_assert!(u32::from(local.x) < size && u32::from(local.y) < size);
            prop_assert_eq!(mapper.local_to_world(chunk, local), world);
        }
    }
}
