//! One record file per chunk on disk.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use atlas_common::{ChunkCoord, CoordinateMapper};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk::{Chunk, ChunkResult};

/// Encoding of chunk records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Header + LZ4-compressed bincode
    #[default]
    Binary,
    /// Pretty-printed JSON record
    Json,
}

impl RecordFormat {
    /// File extension of records in this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Binary => "atch",
            Self::Json => "json",
        }
    }
}

/// Reads and writes chunk records in a save directory.
#[derive(Debug, Clone)]
pub struct ChunkPersistence {
    dir: PathBuf,
    format: RecordFormat,
    mapper: CoordinateMapper,
}

impl ChunkPersistence {
    /// Creates a persistence layer rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, format: RecordFormat, mapper: CoordinateMapper) -> Self {
        Self {
            dir: dir.into(),
            format,
            mapper,
        }
    }

    /// Save directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record encoding.
    #[must_use]
    pub const fn format(&self) -> RecordFormat {
        self.format
    }

    /// Returns the file path for a chunk.
    #[must_use]
    pub fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.dir.join(format!(
            "chunk_{}_{}.{}",
            coord.x,
            coord.y,
            self.format.extension()
        ))
    }

    /// Loads a chunk. `Ok(None)` means no record exists; `Err` means the
    /// record exists but could not be read or decoded.
    pub fn load(&self, coord: ChunkCoord) -> ChunkResult<Option<Chunk>> {
        let path = self.chunk_path(coord);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let chunk = match self.format {
            RecordFormat::Binary => Chunk::deserialize(&bytes, coord, self.mapper)?,
            RecordFormat::Json => Chunk::from_json(&bytes, coord, self.mapper)?,
        };
        debug!("Loaded chunk {coord} from {}", path.display());
        Ok(Some(chunk))
    }

    /// Writes a chunk record. The record is written to a temporary file and
    /// renamed into place so a reader never sees a partial record.
    pub fn save(&self, chunk: &Chunk) -> ChunkResult<()> {
        let bytes = match self.format {
            RecordFormat::Binary => chunk.serialize()?,
            RecordFormat::Json => chunk.to_json()?,
        };
        fs::create_dir_all(&self.dir)?;
        let path = self.chunk_path(chunk.coord());
        let tmp = path.with_extension(format!("{}.tmp", self.format.extension()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved chunk {} to {}", chunk.coord(), path.display());
        Ok(())
    }

    /// Whether a record exists for the chunk.
    #[must_use]
    pub fn exists(&self, coord: ChunkCoord) -> bool {
        self.chunk_path(coord).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GeneratorConfig, TerrainGenerator};
    use tempfile::TempDir;

    fn generator() -> TerrainGenerator {
        TerrainGenerator::new(GeneratorConfig {
            chunk_size: 8,
            ..GeneratorConfig::with_seed(77)
        })
        .expect("valid chunk size")
    }

    #[test]
    fn test_missing_record_is_none() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let persistence = ChunkPersistence::new(dir.path(), RecordFormat::Binary, CoordinateMapper::new(8));
        assert!(persistence.load(ChunkCoord::new(1, 1)).expect("load").is_none());
    }

    #[test]
    fn test_save_load_both_formats() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let chunk = generator().generate_chunk(ChunkCoord::new(-3, 4));

        for format in [RecordFormat::Binary, RecordFormat::Json] {
            let persistence = ChunkPersistence::new(dir.path(), format, CoordinateMapper::new(8));
            persistence.save(&chunk).expect("save failed");
            assert!(persistence.exists(chunk.coord()));
            let path = persistence.chunk_path(chunk.coord());
            assert!(path.to_string_lossy().ends_with(format.extension()));

            let loaded = persistence
                .load(chunk.coord())
                .expect("load failed")
                .expect("record present");
            assert_eq!(loaded.tiles(), chunk.tiles());
            assert!(loaded.is_persisted());
        }
    }

    #[test]
    fn test_corrupt_record_is_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let persistence = ChunkPersistence::new(dir.path(), RecordFormat::Json, CoordinateMapper::new(8));
        let coord = ChunkCoord::new(0, 0);
        fs::write(persistence.chunk_path(coord), b"{ not json").expect("write");
        assert!(persistence.load(coord).is_err());
    }
}
