//! Spawn location allocation around the origin.

use atlas_common::{ChunkCoord, LocalCoord, WorldCoord};
use tracing::{debug, info};

use crate::store::ChunkStore;

/// Spawn allocation settings.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Seed for the allocator's random stream
    pub seed: u64,
    /// Chunks are sampled within this Chebyshev radius of the origin chunk
    pub search_radius: u32,
    /// Minimum Euclidean distance between spawn points; `chunk_size / 4` when unset
    pub min_separation: Option<f64>,
    /// Attempts allowed per requested location
    pub attempts_per_location: u32,
    /// Chance of skipping a sample whose chunk biome is not preferred
    pub non_preferred_skip_chance: f64,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            search_radius: 10,
            min_separation: None,
            attempts_per_location: 10,
            non_preferred_skip_chance: 0.7,
        }
    }
}

/// Picks passable, well-separated spawn points, favoring settled biomes.
#[derive(Debug, Clone)]
pub struct SpawnAllocator {
    config: SpawnConfig,
    rng: fastrand::Rng,
}

impl SpawnAllocator {
    /// Creates an allocator whose random stream starts from `config.seed`.
    #[must_use]
    pub fn new(config: SpawnConfig) -> Self {
        let rng = fastrand::Rng::with_seed(config.seed);
        Self { config, rng }
    }

    /// Allocator settings.
    #[must_use]
    pub const fn config(&self) -> &SpawnConfig {
        &self.config
    }

    /// Generates up to `count` spawn locations. Fewer are returned when the
    /// attempt budget runs out.
    pub fn generate(&mut self, store: &ChunkStore, count: usize) -> Vec<WorldCoord> {
        let chunk_size = store.mapper().chunk_size();
        // mapper sizes are capped at MAX_CHUNK_SIZE, well inside u16
        let side = u16::try_from(chunk_size).unwrap_or(u16::MAX);
        let min_separation = self
            .config
            .min_separation
            .unwrap_or_else(|| f64::from(chunk_size / 4));
        let radius = self.config.search_radius as i32;
        let max_attempts = count.saturating_mul(self.config.attempts_per_location as usize);

        let mut locations: Vec<WorldCoord> = Vec::with_capacity(count);
        let mut attempts = 0;
        while locations.len() < count && attempts < max_attempts {
            attempts += 1;

            let chunk = ChunkCoord::new(
                self.rng.i32(-radius..=radius),
                self.rng.i32(-radius..=radius),
            );
            let biome = store.with_chunk(chunk, |c| c.biome());
            if !biome.is_spawn_preferred() && self.rng.f64() < self.config.non_preferred_skip_chance {
                continue;
            }

            let local = LocalCoord::new(self.rng.u16(0..side), self.rng.u16(0..side));
            let world = store.mapper().local_to_world(chunk, local);
            if store.is_blocked(world) {
                continue;
            }
            if locations
                .iter()
                .any(|existing| existing.distance(world) < min_separation)
            {
                continue;
            }
            debug!("Spawn location {world} in {biome} chunk {chunk}");
            locations.push(world);
        }

        info!(
            "Generated {} of {count} spawn locations in {attempts} attempts",
            locations.len()
        );
        locations
    }
}
