//! World configuration.
//!
//! Every tunable of the world engine lives here. Configuration is loaded from
//! TOML; a missing or unreadable file falls back to defaults, while values
//! that cannot produce a working world are rejected by [`WorldConfig::validate`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use atlas_common::{ConfigError, MAX_CHUNK_SIZE};

use crate::generation::GeneratorConfig;
use crate::pathfinding::PathBounds;
use crate::persist::RecordFormat;
use crate::spawn::SpawnConfig;
use crate::store::StoreConfig;

/// World configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    // === Identity ===
    /// World name, the first level of every tile address
    pub world_name: String,
    /// Generation seed
    pub seed: u64,

    // === Geometry ===
    /// Chunk width and height in tiles
    pub chunk_size: u32,
    /// Rendered tile size in pixels (exports only)
    pub tile_size: u32,

    // === Cache & Persistence ===
    /// Maximum resident chunks
    pub max_loaded_chunks: usize,
    /// Directory holding chunk records
    pub save_dir: PathBuf,
    /// Record encoding
    pub record_format: RecordFormat,

    // === Generation ===
    /// Chunks within this radius of the origin are generated open and flat
    pub safe_origin_radius: Option<u32>,
    /// Chunk radius preloaded around the origin at startup
    pub initial_preload_radius: u32,

    // === Active Regions & Maintenance ===
    /// Width in chunks of each agent's hot neighborhood (odd)
    pub active_region_size: u32,
    /// Chunks farther than this from every agent are evicted by maintenance
    pub keep_distance: u32,
    /// Chunks with `|cx|, |cy| <= protected_radius` are never evicted by maintenance
    pub protected_radius: u32,
    /// Ticks between maintenance passes
    pub maintenance_interval: u64,
    /// Ticks between autosaves (0 = disabled)
    pub autosave_interval: u64,

    // === Pathfinding ===
    /// Maximum Manhattan radius of a search around its start
    pub path_max_distance: u64,
    /// Maximum expanded nodes per search
    pub path_max_expanded: usize,

    // === Spawning ===
    /// Chunk radius sampled for spawn points
    pub spawn_search_radius: u32,
    /// Minimum distance between spawn points (`chunk_size / 4` when unset)
    pub spawn_min_separation: Option<f64>,
    /// Attempt budget per requested spawn point
    pub spawn_attempts_per_location: u32,
    /// Seed of the spawn stream (world seed when unset)
    pub spawn_seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_name: "the Infinite World".to_string(),
            seed: 12345,

            chunk_size: 32,
            tile_size: 32,

            max_loaded_chunks: 100,
            save_dir: PathBuf::from("saves/world"),
            record_format: RecordFormat::Binary,

            safe_origin_radius: None,
            initial_preload_radius: 2,

            active_region_size: 3,
            keep_distance: 5,
            protected_radius: 2,
            maintenance_interval: 600,
            autosave_interval: 6000, // ~100 seconds at 60 ticks/s

            path_max_distance: 100,
            path_max_expanded: 10_000,

            spawn_search_radius: 10,
            spawn_min_separation: None,
            spawn_attempts_per_location: 10,
            spawn_seed: None,
        }
    }
}

impl WorldConfig {
    /// Creates a default config with the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("World config not found at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(config) => {
                    info!("Loaded world config from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("{e}; using defaults");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to read world config: {e}");
                Self::default()
            },
        }
    }

    /// Parses a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved world config to {}", path.display());
        Ok(())
    }

    /// Rejects values that cannot produce a working world.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::NonPositiveChunkSize);
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ChunkSizeTooLarge(self.chunk_size));
        }
        if self.max_loaded_chunks == 0 {
            return Err(ConfigError::NonPositiveCapacity);
        }
        if self.active_region_size == 0 || self.active_region_size % 2 == 0 {
            return Err(ConfigError::InvalidRegionSize(self.active_region_size));
        }
        if self.tile_size == 0 {
            return Err(ConfigError::NonPositive("tile_size"));
        }
        if self.maintenance_interval == 0 {
            return Err(ConfigError::NonPositive("maintenance_interval"));
        }
        if self.path_max_expanded == 0 {
            return Err(ConfigError::NonPositive("path_max_expanded"));
        }
        if self.spawn_attempts_per_location == 0 {
            return Err(ConfigError::NonPositive("spawn_attempts_per_location"));
        }
        Ok(())
    }

    /// Terrain generator settings derived from this config.
    #[must_use]
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            chunk_size: self.chunk_size,
            world_name: self.world_name.clone(),
            safe_origin_radius: self.safe_origin_radius,
            ..GeneratorConfig::with_seed(self.seed)
        }
    }

    /// Chunk store settings derived from this config.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_loaded_chunks: self.max_loaded_chunks,
            save_dir: self.save_dir.clone(),
            record_format: self.record_format,
        }
    }

    /// Pathfinding bounds derived from this config.
    #[must_use]
    pub const fn path_bounds(&self) -> PathBounds {
        PathBounds {
            max_distance: self.path_max_distance,
            max_expanded: self.path_max_expanded,
        }
    }

    /// Spawn allocator settings derived from this config.
    #[must_use]
    pub fn spawn_config(&self) -> SpawnConfig {
        SpawnConfig {
            seed: self.spawn_seed.unwrap_or(self.seed),
            search_radius: self.spawn_search_radius,
            min_separation: self.spawn_min_separation,
            attempts_per_location: self.spawn_attempts_per_location,
            ..SpawnConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = WorldConfig::default();
        assert_eq!(config.chunk_size, 32);
        assert_eq!(config.max_loaded_chunks, 100);
        assert_eq!(config.initial_preload_radius, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = WorldConfig::default();
        config.chunk_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveChunkSize));

        config.chunk_size = MAX_CHUNK_SIZE + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ChunkSizeTooLarge(MAX_CHUNK_SIZE + 1))
        );

        config.chunk_size = 16;
        config.max_loaded_chunks = 0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveCapacity));

        config.max_loaded_chunks = 10;
        config.active_region_size = 2;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRegionSize(2)));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("world.toml");

        let mut config = WorldConfig::with_seed(777);
        config.record_format = RecordFormat::Json;
        config.safe_origin_radius = Some(1);
        config.spawn_min_separation = Some(3.5);
        config.save_to(&config_path).expect("Failed to save config");

        let loaded = WorldConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = WorldConfig::load_from("/nonexistent/path/world.toml");
        assert_eq!(config, WorldConfig::default());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = WorldConfig::from_toml("seed = 9\nrecord_format = \"json\"\n").expect("parse");
        assert_eq!(config.seed, 9);
        assert_eq!(config.record_format, RecordFormat::Json);
        assert_eq!(config.chunk_size, 32);

        assert!(matches!(
            WorldConfig::from_toml("chunk_size = \"big\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_derived_configs() {
        let mut config = WorldConfig::with_seed(5);
        config.chunk_size = 16;
        assert_eq!(config.generator_config().seed, 5);
        assert_eq!(config.generator_config().chunk_size, 16);
        assert_eq!(config.spawn_config().seed, 5);
        config.spawn_seed = Some(8);
        assert_eq!(config.spawn_config().seed, 8);
        assert_eq!(config.path_bounds(), PathBounds::default());
    }
}
