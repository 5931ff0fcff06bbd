//! The infinite world: one handle over the chunk store, active regions,
//! pathfinding and spawn allocation.
//!
//! [`InfiniteWorld`] is `Send + Sync`; every method takes `&self`. Lock order
//! is tracker, then spawner, then the store's own locks.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use atlas_common::{AgentId, ChunkCoord, ConfigError, CoordinateMapper, WorldCoord, WorldResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::WorldConfig;
use crate::export::MapExport;
use crate::generation::TerrainGenerator;
use crate::pathfinding::Pathfinder;
use crate::region::{ActiveRegionTracker, RegionDelta};
use crate::spawn::SpawnAllocator;
use crate::store::{AreaShape, ChunkStore, StoreStats};
use crate::tile::{Tile, TileAddress, TileEvent};

/// Shape of a vision query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Every tile within Chebyshev distance `radius`
    #[default]
    Box,
    /// Every tile within Euclidean distance `radius`
    Radius,
}

/// Snapshot of world counters.
#[derive(Debug, Clone, Serialize)]
pub struct WorldStats {
    /// World name
    pub world_name: String,
    /// Generation seed
    pub seed: u64,
    /// Chunk size in tiles
    pub chunk_size: u32,
    /// Chunk store counters
    #[serde(flatten)]
    pub store: StoreStats,
    /// Chunks in some agent's active region
    pub active_chunks: usize,
    /// Agents being tracked
    pub tracked_agents: usize,
    /// Distinct address keys in the address index
    pub address_mappings: usize,
    /// Ticks since the world was created
    pub ticks: u64,
}

/// Infinite, chunked, procedurally generated world.
#[derive(Debug)]
pub struct InfiniteWorld {
    config: WorldConfig,
    store: ChunkStore,
    tracker: Mutex<ActiveRegionTracker>,
    spawner: Mutex<SpawnAllocator>,
    pathfinder: Pathfinder,
    ticks: AtomicU64,
}

impl InfiniteWorld {
    /// Creates a world and preloads the chunks around the origin.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let generator = TerrainGenerator::new(config.generator_config())?;
        let store = ChunkStore::new(config.store_config(), generator)?;
        let tracker = ActiveRegionTracker::new(store.mapper(), config.active_region_size)?;

        let world = Self {
            tracker: Mutex::new(tracker),
            spawner: Mutex::new(SpawnAllocator::new(config.spawn_config())),
            pathfinder: Pathfinder::new(config.path_bounds()),
            ticks: AtomicU64::new(0),
            store,
            config,
        };

        let preloaded = world.store.preload_area(
            ChunkCoord::new(0, 0),
            world.config.initial_preload_radius,
            AreaShape::Square,
        );
        info!(
            "Created world '{}' (seed {}, chunk size {}), preloaded {preloaded} chunks",
            world.config.world_name, world.config.seed, world.config.chunk_size
        );
        Ok(world)
    }

    /// World configuration.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Underlying chunk store.
    #[must_use]
    pub const fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Coordinate mapper for this world's chunk size.
    #[must_use]
    pub const fn mapper(&self) -> CoordinateMapper {
        self.store.mapper()
    }

    /// Copy of the tile at `coord`. Any coordinate is valid.
    pub fn tile_at(&self, coord: WorldCoord) -> Tile {
        self.store.get_tile(coord)
    }

    /// Path from `src` to `dst` within the configured search bounds.
    pub fn find_path(&self, src: WorldCoord, dst: WorldCoord) -> Vec<WorldCoord> {
        self.pathfinder.find_path(&self.store, src, dst)
    }

    /// Path from `src` to `dst` visiting no tile farther than `max_distance` from `src`.
    pub fn find_path_within(&self, src: WorldCoord, dst: WorldCoord, max_distance: u64) -> Vec<WorldCoord> {
        self.pathfinder
            .find_path_within(&self.store, src, dst, max_distance)
    }

    /// Passable 4-neighbors of `coord`.
    pub fn get_around(&self, coord: WorldCoord) -> Vec<WorldCoord> {
        Pathfinder::get_around(&self.store, coord)
    }

    /// Tiles visible from `center`, row by row.
    pub fn get_scope(&self, center: WorldCoord, radius: u32, mode: ScopeMode) -> Vec<Tile> {
        let r = i64::from(radius);
        (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| mode == ScopeMode::Box || dx * dx + dy * dy <= r * r)
            .map(|(dx, dy)| self.store.get_tile(center.offset(dx, dy)))
            .collect()
    }

    /// Coordinates of every tile carrying `address`; empty when unknown.
    pub fn get_address_tiles(&self, address: &TileAddress) -> HashSet<WorldCoord> {
        self.store.address_tiles(address)
    }

    /// Propagates an object event to every tile of the object at `coord`.
    ///
    /// Applies only when the tile has an object-level address equal to the
    /// event's address. On each tile sharing that address, events with the
    /// same subject are replaced, or the event is attached if none match.
    /// Returns the number of tiles touched.
    pub fn update_obj(&self, coord: WorldCoord, event: &TileEvent) -> WorldResult<usize> {
        let tile = self.store.get_tile(coord);
        if tile.address.object.is_none() || event.address.as_ref() != Some(&tile.address) {
            return Ok(0);
        }

        let mut targets: Vec<WorldCoord> = self.store.address_tiles(&tile.address).into_iter().collect();
        targets.sort_unstable_by_key(|c| (c.y, c.x));
        for &target in &targets {
            self.store
                .update_tile(target, |t| t.upsert_event(event.clone()))?;
        }
        debug!("Event '{event}' propagated to {} tiles of {}", targets.len(), tile.address);
        Ok(targets.len())
    }

    /// Attaches an event to the tile at `coord`. Returns `false` if an
    /// identical event was already attached.
    pub fn add_event(&self, coord: WorldCoord, event: TileEvent) -> WorldResult<bool> {
        self.store.update_tile(coord, |tile| tile.add_event(event))
    }

    /// Removes and returns every event with `subject` from the tile at `coord`.
    pub fn remove_events(&self, coord: WorldCoord, subject: &str) -> WorldResult<Vec<TileEvent>> {
        self.store.update_tile(coord, |tile| tile.remove_events(subject))
    }

    /// Records an agent's position, making its new neighborhood resident.
    pub fn update_agent_position(&self, agent: &AgentId, coord: WorldCoord) -> RegionDelta {
        let delta = self.tracker.lock().update_agent_position(agent, coord);
        for &chunk in &delta.activated {
            self.store.ensure_resident(chunk);
        }
        delta
    }

    /// Stops tracking an agent. Returns the chunks that left the active set.
    pub fn remove_agent(&self, agent: &AgentId) -> Vec<ChunkCoord> {
        self.tracker.lock().remove_agent(agent)
    }

    /// Loads or generates the square of chunks within `radius` of the chunk
    /// containing `coord`. Returns the number that became resident.
    pub fn preload_area_around(&self, coord: WorldCoord, radius: u32) -> usize {
        let center = self.mapper().world_to_chunk(coord);
        let loaded = self.store.preload_area(center, radius, AreaShape::Square);
        debug!("Preloaded area around {coord}, radius {radius} chunks");
        loaded
    }

    /// Up to `count` passable, well-separated spawn locations near the origin.
    pub fn generate_spawn_locations(&self, count: usize) -> Vec<WorldCoord> {
        self.spawner.lock().generate(&self.store, count)
    }

    fn is_protected(&self, coord: ChunkCoord) -> bool {
        let r = self.config.protected_radius;
        coord.x.unsigned_abs() <= r && coord.y.unsigned_abs() <= r
    }

    /// Evicts resident chunks farther than `keep_distance` chunks from every
    /// agent, except the protected origin area and active regions. Returns
    /// the number evicted.
    pub fn cleanup_inactive_chunks(&self, keep_distance: u32) -> usize {
        let tracker = self.tracker.lock();
        let evicted = self.store.evict_where(|coord| {
            !self.is_protected(coord)
                && !tracker.is_active(coord)
                && !tracker.is_within_keep_distance(coord, keep_distance)
        });
        if evicted > 0 {
            info!("Cleaned up {evicted} inactive chunks");
        }
        evicted
    }

    /// Advances the world by one tick, running maintenance and autosave when
    /// their intervals elapse. Returns the new tick count.
    pub fn tick(&self) -> u64 {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if tick % self.config.maintenance_interval == 0 {
            self.cleanup_inactive_chunks(self.config.keep_distance);
        }
        if self.config.autosave_interval > 0 && tick % self.config.autosave_interval == 0 {
            self.store.flush();
        }
        tick
    }

    /// Ticks since creation.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Writes every dirty resident chunk. Returns the number written.
    pub fn save_all(&self) -> usize {
        self.store.flush()
    }

    /// Snapshot of world counters.
    #[must_use]
    pub fn get_stats(&self) -> WorldStats {
        let tracker = self.tracker.lock();
        WorldStats {
            world_name: self.config.world_name.clone(),
            seed: self.config.seed,
            chunk_size: self.config.chunk_size,
            store: self.store.stats(),
            active_chunks: tracker.active_count(),
            tracked_agents: tracker.agent_count(),
            address_mappings: self.store.addresses().len(),
            ticks: self.ticks(),
        }
    }

    /// Writes a JSON map of the `(2 * radius + 1)²` chunks around the chunk
    /// containing `center`.
    pub fn export_current_view(&self, center: WorldCoord, radius: u32, path: &Path) -> WorldResult<MapExport> {
        let chunk = self.mapper().world_to_chunk(center);
        let export = MapExport::capture(&self.store, chunk, radius, self.config.tile_size);
        export.write(path)?;
        Ok(export)
    }

    /// Persists every resident chunk and empties the cache.
    pub fn shutdown(&self) -> WorldResult<usize> {
        let unloaded = self.store.unload_all()?;
        info!("World '{}' shut down, {unloaded} chunks unloaded", self.config.world_name);
        Ok(unloaded)
    }
}
