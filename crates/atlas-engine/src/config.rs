//! Engine configuration.
//!
//! Wraps the world settings together with the simulation driver's own
//! parameters. Configuration can be loaded from and saved to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use atlas_common::ConfigError;
use atlas_world::WorldConfig;

/// Configuration file name.
pub const CONFIG_FILE: &str = "atlas.toml";

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Driver Settings ===
    /// Number of wandering agents to spawn
    pub agents: usize,
    /// Ticks to simulate before shutting down
    pub ticks: u64,
    /// Ticks between agent steps
    pub ticks_per_step: u64,
    /// Maximum distance of a wander target from the agent, in tiles
    pub wander_radius: i64,
    /// Ticks between stats reports (0 = only at shutdown)
    pub stats_interval: u64,
    /// Seed of the driver's own random stream
    pub driver_seed: u64,

    // === Export Settings ===
    /// Where to write the final map view (None = no export)
    pub export_path: Option<PathBuf>,
    /// Chunk radius of the exported view
    pub export_radius: u32,

    // === World Settings ===
    /// World engine settings
    pub world: WorldConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agents: 5,
            ticks: 1200,
            ticks_per_step: 1,
            wander_radius: 24,
            stats_interval: 600,
            driver_seed: 7,

            export_path: Some(PathBuf::from("exports/current_view.json")),
            export_radius: 1,

            world: WorldConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("Failed to parse config file: {e}");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to read config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    #[allow(dead_code)]
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Checks driver and world settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_step == 0 {
            return Err(ConfigError::NonPositive("ticks_per_step"));
        }
        if self.wander_radius <= 0 {
            return Err(ConfigError::NonPositive("wander_radius"));
        }
        self.world.validate()
    }
}
