//! Chunk data structure and serialization.

use atlas_common::{ChunkCoord, CoordinateMapper, LocalCoord, MagicBytes, SchemaVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tile::{Biome, Tile};

/// Chunk errors.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Serialization failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
    /// Deserialization failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
    /// Invalid magic bytes
    #[error("Invalid chunk format")]
    InvalidFormat,
    /// Version mismatch
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version
        actual: String,
    },
    /// Compression failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),
    /// Record content disagrees with where it was found
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for chunk operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Chunk header for the binary record encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// Magic bytes for format identification
    pub magic: [u8; 4],
    /// Schema version
    pub version: SchemaVersion,
    /// Chunk X coordinate
    pub x: i32,
    /// Chunk Y coordinate
    pub y: i32,
    /// Chunk size in tiles
    pub size: u32,
    /// Compression type (0 = none, 1 = lz4)
    pub compression: u8,
}

impl ChunkHeader {
    /// Creates a new header.
    #[must_use]
    pub fn new(coord: ChunkCoord, size: u32) -> Self {
        Self {
            magic: MagicBytes::CHUNK.0,
            version: SchemaVersion::CHUNK_RECORD,
            x: coord.x,
            y: coord.y,
            size,
            compression: 1, // LZ4 by default
        }
    }

    /// Validates the header.
    pub fn validate(&self) -> ChunkResult<()> {
        if self.magic != MagicBytes::CHUNK.0 {
            return Err(ChunkError::InvalidFormat);
        }
        if !SchemaVersion::CHUNK_RECORD.can_read(&self.version) {
            return Err(ChunkError::VersionMismatch {
                expected: SchemaVersion::CHUNK_RECORD.to_string(),
                actual: self.version.to_string(),
            });
        }
        Ok(())
    }
}

/// On-disk form of a chunk: `{chunk_x, chunk_y, biome, tiles, generated}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk X coordinate
    pub chunk_x: i32,
    /// Chunk Y coordinate
    pub chunk_y: i32,
    /// Dominant biome
    pub biome: Biome,
    /// Tile rows, `tiles[y][x]`
    pub tiles: Vec<Vec<Tile>>,
    /// Whether the chunk came from the terrain generator
    #[serde(default = "default_generated")]
    pub generated: bool,
}

const fn default_generated() -> bool {
    true
}

/// A chunk of the world containing tiles.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk coordinate
    coord: ChunkCoord,
    /// Chunk size (width and height in tiles)
    size: u32,
    /// Dominant biome, sampled at the chunk center
    biome: Biome,
    /// Tile data (size × size tiles, row-major)
    tiles: Vec<Tile>,
    /// Whether the chunk came from the terrain generator
    generated: bool,
    /// Whether the chunk currently lives in a store's cache
    resident: bool,
    /// Whether chunk has been modified since last save
    dirty: bool,
    /// Whether a record of this chunk exists on disk
    persisted: bool,
}

impl Chunk {
    /// Creates a chunk from a full row-major tile grid.
    ///
    /// # Panics
    /// Panics if `tiles.len() != size * size`.
    #[must_use]
    pub fn from_tiles(coord: ChunkCoord, size: u32, biome: Biome, tiles: Vec<Tile>) -> Self {
        assert_eq!(tiles.len(), (size * size) as usize, "tile grid size mismatch");
        Self {
            coord,
            size,
            biome,
            tiles,
            generated: true,
            resident: false,
            dirty: false,
            persisted: false,
        }
    }

    /// Returns the chunk coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Returns the chunk size.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Returns the dominant biome.
    #[must_use]
    pub const fn biome(&self) -> Biome {
        self.biome
    }

    /// Whether the chunk came from the terrain generator.
    #[must_use]
    pub const fn is_generated(&self) -> bool {
        self.generated
    }

    /// Whether the chunk is resident in a store.
    #[must_use]
    pub const fn is_resident(&self) -> bool {
        self.resident
    }

    pub(crate) fn set_resident(&mut self, resident: bool) {
        self.resident = resident;
    }

    /// Returns whether the chunk is dirty.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether an on-disk record of this chunk exists.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Marks the chunk as dirty.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Marks the chunk as written to disk.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
        self.persisted = true;
    }

    /// Whether eviction must write this chunk before dropping it.
    #[must_use]
    pub const fn needs_save(&self) -> bool {
        self.dirty || !self.persisted
    }

    /// Gets a tile at local coordinates.
    #[must_use]
    pub fn get_tile(&self, local: LocalCoord) -> Option<&Tile> {
        if u32::from(local.x) >= self.size || u32::from(local.y) >= self.size {
            return None;
        }
        self.tiles.get(local.to_index(self.size))
    }

    /// Tile at a local coordinate produced by a [`CoordinateMapper`] of the
    /// same chunk size.
    ///
    /// # Panics
    /// Panics if `local` lies outside the chunk.
    #[must_use]
    pub fn tile(&self, local: LocalCoord) -> &Tile {
        &self.tiles[local.to_index(self.size)]
    }

    /// Gets a mutable tile at local coordinates and marks the chunk dirty.
    pub fn get_tile_mut(&mut self, local: LocalCoord) -> Option<&mut Tile> {
        if u32::from(local.x) >= self.size || u32::from(local.y) >= self.size {
            return None;
        }
        self.dirty = true;
        self.tiles.get_mut(local.to_index(self.size))
    }

    /// Sets a tile at local coordinates.
    pub fn set_tile(&mut self, local: LocalCoord, tile: Tile) -> bool {
        match self.get_tile_mut(local) {
            Some(slot) => {
                *slot = tile;
                true
            },
            None => false,
        }
    }

    /// Returns a slice of all tiles, row-major.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Mutable tiles, row-major.
    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    /// Converts the chunk into its on-disk record.
    #[must_use]
    pub fn to_record(&self) -> ChunkRecord {
        ChunkRecord {
            chunk_x: self.coord.x,
            chunk_y: self.coord.y,
            biome: self.biome,
            tiles: self
                .tiles
                .chunks(self.size as usize)
                .map(<[Tile]>::to_vec)
                .collect(),
            generated: self.generated,
        }
    }

    /// Rebuilds a chunk from a record, checking it against the expected
    /// coordinate and chunk size.
    pub fn from_record(
        record: ChunkRecord,
        expected: ChunkCoord,
        mapper: CoordinateMapper,
    ) -> ChunkResult<Self> {
        let coord = ChunkCoord::new(record.chunk_x, record.chunk_y);
        if coord != expected {
            return Err(ChunkError::InvalidRecord(format!(
                "record for chunk {coord} stored as {expected}"
            )));
        }
        let size = mapper.chunk_size();
        if record.tiles.len() != size as usize
            || record.tiles.iter().any(|row| row.len() != size as usize)
        {
            return Err(ChunkError::InvalidRecord(format!(
                "tile grid is not {size}x{size}"
            )));
        }

        let tiles: Vec<Tile> = record.tiles.into_iter().flatten().collect();
        for (index, tile) in tiles.iter().enumerate() {
            let local = LocalCoord::from_index(index, size);
            if tile.coord != mapper.local_to_world(coord, local) {
                return Err(ChunkError::InvalidRecord(format!(
                    "tile {} found at local ({}, {})",
                    tile.coord, local.x, local.y
                )));
            }
        }

        Ok(Self {
            coord,
            size,
            biome: record.biome,
            tiles,
            generated: record.generated,
            resident: false,
            dirty: false,
            persisted: true,
        })
    }

    /// Serializes the chunk to the binary record encoding.
    pub fn serialize(&self) -> ChunkResult<Vec<u8>> {
        let header = ChunkHeader::new(self.coord, self.size);

        // Serialize header
        let header_bytes = bincode::serialize(&header)
            .map_err(|e| ChunkError::SerializationFailed(e.to_string()))?;

        // Serialize record body
        let body = bincode::serialize(&self.to_record())
            .map_err(|e| ChunkError::SerializationFailed(e.to_string()))?;

        let compressed = lz4_flex::compress_prepend_size(&body);

        // Combine header + compressed body
        let mut result = Vec::with_capacity(header_bytes.len() + compressed.len() + 4);
        result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        result.extend_from_slice(&header_bytes);
        result.extend_from_slice(&compressed);

        Ok(result)
    }

    /// Deserializes a chunk from the binary record encoding.
    pub fn deserialize(
        bytes: &[u8],
        expected: ChunkCoord,
        mapper: CoordinateMapper,
    ) -> ChunkResult<Self> {
        if bytes.len() < 8 {
            return Err(ChunkError::DeserializationFailed("data too short".into()));
        }

        // Read header length
        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() < 4 + header_len {
            return Err(ChunkError::DeserializationFailed(
                "header length mismatch".into(),
            ));
        }

        // Deserialize header
        let header: ChunkHeader = bincode::deserialize(&bytes[4..4 + header_len])
            .map_err(|e| ChunkError::DeserializationFailed(e.to_string()))?;
        header.validate()?;
        if header.size != mapper.chunk_size() {
            return Err(ChunkError::InvalidRecord(format!(
                "chunk size {} does not match configured {}",
                header.size,
                mapper.chunk_size()
            )));
        }

        let compressed = &bytes[4 + header_len..];
        let body = match header.compression {
            0 => compressed.to_vec(),
            _ => lz4_flex::decompress_size_prepended(compressed)
                .map_err(|e| ChunkError::CompressionFailed(e.to_string()))?,
        };

        let record: ChunkRecord = bincode::deserialize(&body)
            .map_err(|e| ChunkError::DeserializationFailed(e.to_string()))?;
        Self::from_record(record, expected, mapper)
    }

    /// Serializes the chunk as a pretty-printed JSON record.
    pub fn to_json(&self) -> ChunkResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.to_record())
            .map_err(|e| ChunkError::SerializationFailed(e.to_string()))
    }

    /// Deserializes a chunk from a JSON record.
    pub fn from_json(
        bytes: &[u8],
        expected: ChunkCoord,
        mapper: CoordinateMapper,
    ) -> ChunkResult<Self> {
        let record: ChunkRecord = serde_json::from_slice(bytes)
            .map_err(|e| ChunkError::DeserializationFailed(e.to_string()))?;
        Self::from_record(record, expected, mapper)
    }
}
