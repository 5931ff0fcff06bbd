//! Static map export of the chunks around a point, for debugging and
//! tile-map viewers.

use std::fs;
use std::path::Path;

use atlas_common::{ChunkCoord, LocalCoord, SchemaVersion, WorldError, WorldResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::ChunkStore;

/// One row-major layer of per-tile values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLayer {
    /// Layer name (`terrain`, `collision`, `features`)
    pub name: String,
    /// Layer kind as understood by tile-map viewers
    #[serde(rename = "type")]
    pub kind: String,
    /// Width in tiles
    pub width: u32,
    /// Height in tiles
    pub height: u32,
    /// `width * height` values, row-major
    pub data: Vec<u32>,
}

impl MapLayer {
    fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: "tilelayer".to_string(),
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }
}

/// Fixed-size map of a square of chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapExport {
    /// Export format version, `major.minor`
    pub format_version: String,
    /// Width in tiles
    pub width: u32,
    /// Height in tiles
    pub height: u32,
    /// Rendered tile size in pixels
    pub tile_size: u32,
    /// Rendered tile width in pixels
    pub tilewidth: u32,
    /// Rendered tile height in pixels
    pub tileheight: u32,
    /// Always `false`: the export is a finite snapshot
    pub infinite: bool,
    /// Terrain, collision and feature layers
    pub layers: Vec<MapLayer>,
}

impl MapExport {
    /// Builds an export of the `(2 * radius + 1)²` chunks around `center`.
    pub fn capture(store: &ChunkStore, center: ChunkCoord, radius: u32, tile_size: u32) -> Self {
        let chunk_size = store.mapper().chunk_size();
        let side = 2 * radius + 1;
        let (width, height) = (side * chunk_size, side * chunk_size);

        let mut terrain = MapLayer::new("terrain", width, height);
        let mut collision = MapLayer::new("collision", width, height);
        let mut features = MapLayer::new("features", width, height);

        let origin = center.offset(-(radius as i32), -(radius as i32));
        for coord in center.square(radius) {
            let offset_x = (coord.x - origin.x) as u32 * chunk_size;
            let offset_y = (coord.y - origin.y) as u32 * chunk_size;
            store.with_chunk(coord, |chunk| {
                for (index, tile) in chunk.tiles().iter().enumerate() {
                    let local = LocalCoord::from_index(index, chunk_size);
                    let x = offset_x + u32::from(local.x);
                    let y = offset_y + u32::from(local.y);
                    let at = (y * width + x) as usize;
                    terrain.data[at] = u32::from(tile.tile_id);
                    collision.data[at] = u32::from(tile.collision);
                    features.data[at] = tile.feature_layer_id();
                }
            });
        }

        Self {
            format_version: SchemaVersion::MAP_EXPORT.to_string(),
            width,
            height,
            tile_size,
            tilewidth: tile_size,
            tileheight: tile_size,
            infinite: false,
            layers: vec![terrain, collision, features],
        }
    }

    /// Layer by name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&MapLayer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// Writes the export as pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> WorldResult<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| WorldError::ExportFailed(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WorldError::ExportFailed(e.to_string()))?;
        }
        fs::write(path, json).map_err(|e| WorldError::ExportFailed(e.to_string()))?;
        info!(
            "Exported {}x{} map view to {}",
            self.width,
            self.height,
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GeneratorConfig, TerrainGenerator};
    use crate::store::StoreConfig;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ChunkStore {
        ChunkStore::new(
            StoreConfig {
                max_loaded_chunks: 16,
                save_dir: dir.path().join("chunks"),
                ..StoreConfig::default()
            },
            TerrainGenerator::new(GeneratorConfig {
                chunk_size: 8,
                ..GeneratorConfig::with_seed(5)
            })
            .expect("valid chunk size"),
        )
        .expect("valid store config")
    }

    #[test]
    fn test_export_dimensions() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        let export = MapExport::capture(&store, ChunkCoord::new(0, 0), 1, 32);
        assert_eq!((export.width, export.height), (24, 24));
        assert_eq!(export.layers.len(), 3);
        for layer in &export.layers {
            assert_eq!(layer.data.len(), 24 * 24);
            assert_eq!(layer.kind, "tilelayer");
        }
        assert!(export
            .layer("collision")
            .expect("collision layer")
            .data
            .iter()
            .all(|&v| v <= 1));
    }

    #[test]
    fn test_export_matches_tiles() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        let export = MapExport::capture(&store, ChunkCoord::new(3, -2), 1, 16);
        let terrain = export.layer("terrain").expect("terrain layer");
        // Export origin is the top-left tile of chunk (2, -3).
        let origin = store.mapper().chunk_to_world(ChunkCoord::new(2, -3));
        for (x, y) in [(0, 0), (5, 11), (23, 23)] {
            let tile = store.get_tile(origin.offset(x, y));
            assert_eq!(terrain.data[(y * 24 + x) as usize], u32::from(tile.tile_id));
        }
    }

    #[test]
    fn test_write_json() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        let path = dir.path().join("exports").join("view.json");
        MapExport::capture(&store, ChunkCoord::new(0, 0), 0, 32)
            .write(&path)
            .expect("export");

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read export")).expect("valid json");
        assert_eq!(value["format_version"], SchemaVersion::MAP_EXPORT.to_string());
        assert_eq!(value["width"], 8);
        assert_eq!(value["tile_size"], 32);
        assert_eq!(value["layers"][0]["name"], "terrain");
        assert_eq!(value["layers"][2]["name"], "features");
    }
}
