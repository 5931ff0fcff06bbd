//! Chunk cache with LRU eviction and disk persistence.
//!
//! Resident chunks live in an arena of slots addressed through a
//! coordinate index. Recency is tracked separately so cache hits only need
//! the shared lock on the arena. Lock order is always arena, then recency.
//!
//! A chunk whose record cannot be written is never dropped. When eviction
//! cannot free a slot the requested chunk is served detached: it is not
//! cached, and any mutation of it is written through to disk immediately.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use atlas_common::{
    ChunkCoord, ConfigError, CoordinateMapper, WorldCoord, WorldError, WorldResult,
};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::AddressIndex;
use crate::chunk::Chunk;
use crate::generation::TerrainGenerator;
use crate::persist::{ChunkPersistence, RecordFormat};
use crate::tile::{Tile, TileAddress};

/// Chunk store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of resident chunks
    pub max_loaded_chunks: usize,
    /// Directory holding one record file per chunk
    pub save_dir: PathBuf,
    /// Record encoding
    pub record_format: RecordFormat,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_loaded_chunks: 100,
            save_dir: PathBuf::from("saves/world"),
            record_format: RecordFormat::Binary,
        }
    }
}

/// Shape of a preload area measured in chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaShape {
    /// Every chunk within Chebyshev distance `radius`
    #[default]
    Square,
    /// Every chunk within Manhattan distance `radius`
    Diamond,
}

/// Snapshot of cache counters.
///
/// Serialized keys follow the world's external stats format, so `generated`
/// appears as `chunks_generated` and `resident_count` as `loaded_chunks_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Chunks produced by the terrain generator
    #[serde(rename = "chunks_generated")]
    pub generated: u64,
    /// Chunks read back from disk
    pub loaded: u64,
    /// Chunks removed from the cache
    pub evicted: u64,
    /// Requests served from the cache
    pub cache_hits: u64,
    /// Requests that had to load or generate
    pub cache_misses: u64,
    /// Record writes that failed
    pub persist_failures: u64,
    /// Hits as a percentage of all requests
    pub cache_hit_rate: f64,
    /// Chunks currently resident
    #[serde(rename = "loaded_chunks_count")]
    pub resident_count: usize,
}

#[derive(Debug, Default)]
struct Counters {
    generated: AtomicU64,
    loaded: AtomicU64,
    evicted: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    persist_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Least-recently-used ordering of resident chunks.
#[derive(Debug, Default)]
struct LruOrder {
    stamps: AHashMap<ChunkCoord, u64>,
    order: BTreeMap<u64, ChunkCoord>,
    clock: u64,
}

impl LruOrder {
    fn touch(&mut self, coord: ChunkCoord) {
        self.clock += 1;
        if let Some(old) = self.stamps.insert(coord, self.clock) {
            self.order.remove(&old);
        }
        self.order.insert(self.clock, coord);
    }

    fn remove(&mut self, coord: ChunkCoord) {
        if let Some(stamp) = self.stamps.remove(&coord) {
            self.order.remove(&stamp);
        }
    }

    /// Oldest first.
    fn oldest(&self) -> Vec<ChunkCoord> {
        self.order.values().copied().collect()
    }

    fn clear(&mut self) {
        self.stamps.clear();
        self.order.clear();
    }
}

#[derive(Debug, Default)]
struct StoreState {
    slots: Vec<Option<Chunk>>,
    free: Vec<usize>,
    index: AHashMap<ChunkCoord, usize>,
}

impl StoreState {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.index
            .get(&coord)
            .and_then(|&slot| self.slots.get(slot))
            .and_then(Option::as_ref)
    }

    fn slot(&self, slot: usize) -> Option<&Chunk> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, slot: usize) -> Option<&mut Chunk> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    fn insert(&mut self, mut chunk: Chunk) -> usize {
        chunk.set_resident(true);
        let coord = chunk.coord();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(chunk);
                slot
            },
            None => {
                self.slots.push(Some(chunk));
                self.slots.len() - 1
            },
        };
        self.index.insert(coord, slot);
        slot
    }

    fn remove(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        let slot = self.index.remove(&coord)?;
        let mut chunk = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        chunk.set_resident(false);
        Some(chunk)
    }

    fn chunks_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

/// Where a requested chunk ended up.
enum Residency {
    Cached(usize),
    Detached(Chunk),
}

/// Bounded cache of chunks backed by a save directory.
#[derive(Debug)]
pub struct ChunkStore {
    config: StoreConfig,
    generator: TerrainGenerator,
    persistence: ChunkPersistence,
    mapper: CoordinateMapper,
    state: RwLock<StoreState>,
    recency: Mutex<LruOrder>,
    addresses: AddressIndex,
    counters: Counters,
}

impl ChunkStore {
    /// Creates an empty store.
    pub fn new(config: StoreConfig, generator: TerrainGenerator) -> Result<Self, ConfigError> {
        if config.max_loaded_chunks == 0 {
            return Err(ConfigError::NonPositiveCapacity);
        }
        let mapper = generator.mapper();
        info!(
            "Creating chunk store (capacity {}, {:?} records in {})",
            config.max_loaded_chunks,
            config.record_format,
            config.save_dir.display()
        );
        Ok(Self {
            persistence: ChunkPersistence::new(
                config.save_dir.clone(),
                config.record_format,
                mapper,
            ),
            config,
            generator,
            mapper,
            state: RwLock::new(StoreState::default()),
            recency: Mutex::new(LruOrder::default()),
            addresses: AddressIndex::new(),
            counters: Counters::default(),
        })
    }

    /// Store configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Terrain generator used for chunks without a record.
    #[must_use]
    pub const fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    /// Coordinate mapper shared by every chunk in the store.
    #[must_use]
    pub const fn mapper(&self) -> CoordinateMapper {
        self.mapper
    }

    /// Persistence layer.
    #[must_use]
    pub const fn persistence(&self) -> &ChunkPersistence {
        &self.persistence
    }

    /// Address index over resident chunks and explicitly addressed tiles.
    #[must_use]
    pub const fn addresses(&self) -> &AddressIndex {
        &self.addresses
    }

    /// Returns a snapshot of the chunk at `coord`.
    ///
    /// With `autogenerate` unset, a chunk that is neither resident nor on
    /// disk yields `None` instead of being generated.
    pub fn get_chunk(&self, coord: ChunkCoord, autogenerate: bool) -> Option<Chunk> {
        {
            let state = self.state.read();
            if let Some(chunk) = state.get(coord) {
                self.hit(coord);
                return Some(chunk.clone());
            }
        }

        let mut state = self.state.write();
        let residency = if autogenerate {
            self.materialize(&mut state, coord)
        } else {
            self.locate(&mut state, coord)?
        };
        match residency {
            Residency::Cached(slot) => state.slot(slot).cloned(),
            Residency::Detached(chunk) => Some(chunk),
        }
    }

    /// Runs `f` against the chunk at `coord`, loading or generating it first.
    pub fn with_chunk<R>(&self, coord: ChunkCoord, f: impl FnOnce(&Chunk) -> R) -> R {
        {
            let state = self.state.read();
            if let Some(chunk) = state.get(coord) {
                self.hit(coord);
                return f(chunk);
            }
        }

        let mut state = self.state.write();
        match self.materialize(&mut state, coord) {
            Residency::Cached(slot) => {
                let state = RwLockWriteGuard::downgrade(state);
                if let Some(chunk) = state.slot(slot) {
                    return f(chunk);
                }
                // the guard was held since admission, so the slot is only
                // empty if the index is corrupt
                drop(state);
                warn!("Chunk {coord} missing from slot {slot}; serving it uncached");
                let chunk = self
                    .read_record(coord)
                    .unwrap_or_else(|| self.generator.generate_chunk(coord));
                f(&chunk)
            },
            Residency::Detached(chunk) => {
                drop(state);
                f(&chunk)
            },
        }
    }

    /// Runs `f` against a mutable chunk and marks it dirty. A detached chunk
    /// is written through before returning.
    fn mutate_chunk<R>(
        &self,
        coord: ChunkCoord,
        f: impl FnOnce(&mut Chunk) -> WorldResult<R>,
    ) -> WorldResult<R> {
        let mut state = self.state.write();
        match self.materialize(&mut state, coord) {
            Residency::Cached(slot) => {
                let chunk = state.slot_mut(slot).ok_or_else(|| {
                    WorldError::InvalidData(format!("chunk {coord} vanished from its slot"))
                })?;
                chunk.mark_dirty();
                f(chunk)
            },
            Residency::Detached(mut chunk) => {
                chunk.mark_dirty();
                let result = f(&mut chunk)?;
                if let Err(e) = self.persistence.save(&chunk) {
                    Counters::bump(&self.counters.persist_failures);
                    return Err(WorldError::SaveFailed(format!(
                        "detached chunk {coord} could not be written through: {e}"
                    )));
                }
                Ok(result)
            },
        }
    }

    /// Runs `f` against a mutable chunk and marks it dirty. Tile
    /// coordinates are restored afterwards and the address index is updated
    /// for every tile whose address changed.
    pub fn with_chunk_mut<R>(&self, coord: ChunkCoord, f: impl FnOnce(&mut Chunk) -> R) -> WorldResult<R> {
        self.mutate_chunk(coord, |chunk| {
            let before: Vec<(WorldCoord, TileAddress)> = chunk
                .tiles()
                .iter()
                .map(|tile| (tile.coord, tile.address.clone()))
                .collect();
            let result = f(chunk);
            for (tile, (world, old)) in chunk.tiles_mut().iter_mut().zip(&before) {
                tile.coord = *world;
                if tile.address != *old {
                    self.addresses.replace(*world, old, &tile.address);
                }
            }
            Ok(result)
        })
    }

    /// Returns a copy of the tile at `world`.
    pub fn get_tile(&self, world: WorldCoord) -> Tile {
        let (coord, local) = self.mapper.split(world);
        self.with_chunk(coord, |chunk| chunk.tile(local).clone())
    }

    /// Whether the tile at `world` blocks movement.
    pub fn is_blocked(&self, world: WorldCoord) -> bool {
        let (coord, local) = self.mapper.split(world);
        self.with_chunk(coord, |chunk| chunk.tile(local).collision)
    }

    /// Applies `f` to the tile at `world`, keeping the address index in step
    /// with any address change. The tile's coordinate cannot be changed.
    pub fn update_tile<R>(&self, world: WorldCoord, f: impl FnOnce(&mut Tile) -> R) -> WorldResult<R> {
        let (coord, local) = self.mapper.split(world);
        self.mutate_chunk(coord, |chunk| {
            let tile = chunk.get_tile_mut(local).ok_or_else(|| {
                WorldError::InvalidData(format!("local {local:?} outside chunk {coord}"))
            })?;
            let before = tile.address.clone();
            let result = f(tile);
            tile.coord = world;
            self.addresses.replace(world, &before, &tile.address);
            Ok(result)
        })
    }

    /// Replaces the tile at `world`.
    pub fn set_tile(&self, world: WorldCoord, tile: Tile) -> WorldResult<()> {
        self.update_tile(world, |slot| *slot = tile)
    }

    /// Makes `coord` resident. Returns `true` if it was not resident before.
    pub fn ensure_resident(&self, coord: ChunkCoord) -> bool {
        if self.is_resident(coord) {
            self.hit(coord);
            return false;
        }
        let mut state = self.state.write();
        let was_resident = state.get(coord).is_some();
        match self.materialize(&mut state, coord) {
            Residency::Cached(_) => !was_resident,
            Residency::Detached(_) => false,
        }
    }

    /// Loads or generates every chunk of the area around `center`. Returns
    /// the number of chunks that became resident.
    pub fn preload_area(&self, center: ChunkCoord, radius: u32, shape: AreaShape) -> usize {
        let coords: Vec<ChunkCoord> = center
            .square(radius)
            .filter(|c| shape == AreaShape::Square || c.manhattan(center) <= radius)
            .collect();
        if coords.len() > self.config.max_loaded_chunks {
            warn!(
                "Preload of {} chunks around {center} exceeds cache capacity {}",
                coords.len(),
                self.config.max_loaded_chunks
            );
        }
        let loaded = coords.into_iter().filter(|&c| self.ensure_resident(c)).count();
        debug!("Preloaded {loaded} chunks around {center} (radius {radius}, {shape:?})");
        loaded
    }

    /// Snapshots of every chunk overlapping the world-space rectangle.
    pub fn get_chunks_in_area(&self, origin: WorldCoord, width: u32, height: u32) -> Vec<Chunk> {
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let first = self.mapper.world_to_chunk(origin);
        let last = self.mapper.world_to_chunk(
            origin.offset(i64::from(width) - 1, i64::from(height) - 1),
        );
        (first.y..=last.y)
            .flat_map(|cy| (first.x..=last.x).map(move |cx| ChunkCoord::new(cx, cy)))
            .filter_map(|coord| self.get_chunk(coord, true))
            .collect()
    }

    /// Whether `coord` is resident.
    #[must_use]
    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        self.state.read().index.contains_key(&coord)
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.state.read().len()
    }

    /// Resident chunk coordinates, least recently used first.
    #[must_use]
    pub fn resident_coords(&self) -> Vec<ChunkCoord> {
        let _state = self.state.read();
        self.recency.lock().oldest()
    }

    /// Evicts `coord`, persisting it first if needed. Returns `false` if the
    /// chunk was not resident or its record could not be written.
    pub fn evict(&self, coord: ChunkCoord) -> bool {
        let mut state = self.state.write();
        self.evict_locked(&mut state, coord)
    }

    /// Evicts every resident chunk matching `predicate`. Returns the number
    /// of chunks evicted.
    pub fn evict_where(&self, mut predicate: impl FnMut(ChunkCoord) -> bool) -> usize {
        let mut state = self.state.write();
        let victims: Vec<ChunkCoord> = state.index.keys().copied().filter(|&c| predicate(c)).collect();
        victims
            .into_iter()
            .filter(|&coord| self.evict_locked(&mut state, coord))
            .count()
    }

    /// Writes every dirty resident chunk. Returns the number written.
    pub fn flush(&self) -> usize {
        let mut state = self.state.write();
        let mut saved = 0;
        for chunk in state.chunks_mut().filter(|c| c.is_dirty()) {
            match self.persistence.save(chunk) {
                Ok(()) => {
                    chunk.mark_saved();
                    saved += 1;
                },
                Err(e) => {
                    Counters::bump(&self.counters.persist_failures);
                    warn!("Failed to save chunk {}: {e}", chunk.coord());
                },
            }
        }
        if saved > 0 {
            info!("Saved {saved} chunks");
        }
        saved
    }

    /// Persists every resident chunk and empties the cache. Chunks that fail
    /// to save stay resident and are reported as an error.
    pub fn unload_all(&self) -> WorldResult<usize> {
        let mut state = self.state.write();
        let coords: Vec<ChunkCoord> = state.index.keys().copied().collect();
        let total = coords.len();
        let failed = coords
            .into_iter()
            .filter(|&coord| !self.evict_locked(&mut state, coord))
            .count();
        if state.len() == 0 {
            self.recency.lock().clear();
        }
        info!("Unloaded {} of {total} chunks", total - failed);
        if failed > 0 {
            return Err(WorldError::SaveFailed(format!(
                "{failed} chunks could not be written and remain resident"
            )));
        }
        Ok(total)
    }

    /// Coordinates of every tile carrying `address`.
    #[must_use]
    pub fn address_tiles(&self, address: &TileAddress) -> HashSet<WorldCoord> {
        self.addresses.lookup(address)
    }

    /// Snapshot of cache counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let cache_hits = load(&self.counters.hits);
        let cache_misses = load(&self.counters.misses);
        let requests = cache_hits + cache_misses;
        StoreStats {
            generated: load(&self.counters.generated),
            loaded: load(&self.counters.loaded),
            evicted: load(&self.counters.evicted),
            cache_hits,
            cache_misses,
            persist_failures: load(&self.counters.persist_failures),
            cache_hit_rate: if requests == 0 {
                0.0
            } else {
                cache_hits as f64 / requests as f64 * 100.0
            },
            resident_count: self.resident_count(),
        }
    }

    fn hit(&self, coord: ChunkCoord) {
        Counters::bump(&self.counters.hits);
        self.recency.lock().touch(coord);
    }

    /// Finds `coord` in the cache or on disk without generating.
    fn locate(&self, state: &mut StoreState, coord: ChunkCoord) -> Option<Residency> {
        if let Some(&slot) = state.index.get(&coord) {
            self.hit(coord);
            return Some(Residency::Cached(slot));
        }
        Counters::bump(&self.counters.misses);
        let chunk = self.read_record(coord)?;
        Counters::bump(&self.counters.loaded);
        Some(self.admit(state, chunk))
    }

    /// Finds `coord` in the cache or on disk, generating it otherwise.
    fn materialize(&self, state: &mut StoreState, coord: ChunkCoord) -> Residency {
        if let Some(&slot) = state.index.get(&coord) {
            self.hit(coord);
            return Residency::Cached(slot);
        }
        Counters::bump(&self.counters.misses);
        let chunk = match self.read_record(coord) {
            Some(chunk) => {
                Counters::bump(&self.counters.loaded);
                chunk
            },
            None => {
                Counters::bump(&self.counters.generated);
                self.generator.generate_chunk(coord)
            },
        };
        self.admit(state, chunk)
    }

    /// Reads a record, treating an unreadable one as absent.
    fn read_record(&self, coord: ChunkCoord) -> Option<Chunk> {
        match self.persistence.load(coord) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Discarding unreadable record for chunk {coord}: {e}");
                None
            },
        }
    }

    /// Caches a newly materialized chunk and indexes its addresses if room
    /// can be made.
    fn admit(&self, state: &mut StoreState, chunk: Chunk) -> Residency {
        if !self.make_room(state) {
            warn!(
                "Cache full of unsaveable chunks; serving chunk {} detached",
                chunk.coord()
            );
            return Residency::Detached(chunk);
        }
        let coord = chunk.coord();
        self.addresses.insert_tiles(chunk.tiles());
        let slot = state.insert(chunk);
        self.recency.lock().touch(coord);
        Residency::Cached(slot)
    }

    /// Evicts least recently used chunks until one slot is free. Victims whose
    /// record cannot be written are skipped.
    fn make_room(&self, state: &mut StoreState) -> bool {
        let capacity = self.config.max_loaded_chunks;
        if state.len() < capacity {
            return true;
        }
        let candidates = self.recency.lock().oldest();
        for coord in candidates {
            if state.len() < capacity {
                break;
            }
            self.evict_locked(state, coord);
        }
        state.len() < capacity
    }

    fn evict_locked(&self, state: &mut StoreState, coord: ChunkCoord) -> bool {
        let Some(&slot) = state.index.get(&coord) else {
            return false;
        };
        if let Some(chunk) = state.slot_mut(slot) {
            if chunk.needs_save() {
                if let Err(e) = self.persistence.save(chunk) {
                    Counters::bump(&self.counters.persist_failures);
                    warn!("Keeping chunk {coord} resident, save failed: {e}");
                    return false;
                }
                chunk.mark_saved();
            }
        }
        if let Some(chunk) = state.remove(coord) {
            self.addresses.release_tiles(chunk.tiles());
        }
        self.recency.lock().remove(coord);
        Counters::bump(&self.counters.evicted);
        debug!("Evicted chunk {coord}");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GeneratorConfig;
    use crate::tile::TileEvent;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(dir: &TempDir, capacity: usize) -> ChunkStore {
        store_at(dir.path().to_path_buf(), capacity, RecordFormat::Binary)
    }

    fn store_at(save_dir: PathBuf, capacity: usize, record_format: RecordFormat) -> ChunkStore {
        let generator = TerrainGenerator::new(GeneratorConfig {
            chunk_size: 8,
            ..GeneratorConfig::with_seed(42)
        })
        .expect("valid chunk size");
        ChunkStore::new(
            StoreConfig {
                max_loaded_chunks: capacity,
                save_dir,
                record_format,
            },
            generator,
        )
        .expect("valid store config")
    }

    fn c(x: i32, y: i32) -> ChunkCoord {
        ChunkCoord::new(x, y)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ChunkStore::new(
            StoreConfig {
                max_loaded_chunks: 0,
                ..StoreConfig::default()
            },
            TerrainGenerator::with_seed(1),
        )
        .expect_err("zero capacity must fail");
        assert_eq!(err, ConfigError::NonPositiveCapacity);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let built = TerrainGenerator::new(GeneratorConfig {
            chunk_size: 0,
            ..GeneratorConfig::with_seed(1)
        })
        .and_then(|generator| ChunkStore::new(StoreConfig::default(), generator));
        assert_eq!(
            built.expect_err("zero chunk size must fail"),
            ConfigError::NonPositiveChunkSize
        );
    }

    #[test]
    fn test_lru_eviction_order() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 4);
        let (a, b, cc, d, e) = (c(10, 0), c(11, 0), c(12, 0), c(13, 0), c(14, 0));
        for coord in [a, b, cc, d, e] {
            store.get_chunk(coord, true).expect("chunk");
        }
        assert_eq!(store.resident_count(), 4);
        assert!(!store.is_resident(a));
        assert_eq!(store.resident_coords(), vec![b, cc, d, e]);
    }

    #[test]
    fn test_hit_refreshes_recency() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 3);
        for coord in [c(0, 5), c(1, 5), c(2, 5)] {
            store.get_chunk(coord, true);
        }
        store.get_chunk(c(0, 5), true);
        store.get_chunk(c(3, 5), true);
        assert!(store.is_resident(c(0, 5)));
        assert!(!store.is_resident(c(1, 5)));
        assert_eq!(store.stats().cache_hits, 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 5);
        let mut rng = fastrand::Rng::with_seed(9);
        for _ in 0..200 {
            let coord = c(rng.i32(-6..6), rng.i32(-6..6));
            store.get_chunk(coord, true);
            assert!(store.resident_count() <= 5);
        }
        let stats = store.stats();
        assert_eq!(stats.cache_hits + stats.cache_misses, 200);
    }

    #[test]
    fn test_evicted_mutation_survives_reload() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 2);
        let spot = WorldCoord::new(3, 3);
        store
            .update_tile(spot, |tile| tile.add_event(TileEvent::triple("alice", "is", "here")))
            .expect("update");

        store.get_chunk(c(5, 5), true);
        store.get_chunk(c(6, 5), true);
        assert!(!store.is_resident(c(0, 0)));
        assert!(store.persistence().exists(c(0, 0)));

        let tile = store.get_tile(spot);
        assert_eq!(tile.events().len(), 1);
        assert_eq!(tile.events()[0].subject, "alice");
        assert_eq!(store.stats().loaded, 1);
    }

    #[test]
    fn test_autogenerate_off_returns_none() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 4);
        assert!(store.get_chunk(c(40, 40), false).is_none());
        assert_eq!(store.stats().generated, 0);

        store.get_chunk(c(40, 40), true);
        assert!(store.evict(c(40, 40)));
        let reloaded = store.get_chunk(c(40, 40), false).expect("record on disk");
        assert!(reloaded.is_persisted());
    }

    #[test]
    fn test_corrupt_record_regenerated() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 4);
        let coord = c(7, -7);
        std::fs::write(store.persistence().chunk_path(coord), b"garbage").expect("write");

        let chunk = store.get_chunk(coord, true).expect("chunk");
        let fresh = store.generator().generate_chunk(coord);
        assert_eq!(chunk.tiles(), fresh.tiles());
        assert_eq!(store.stats().generated, 1);
        assert_eq!(store.stats().loaded, 0);
    }

    #[test]
    fn test_json_records() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_at(dir.path().to_path_buf(), 1, RecordFormat::Json);
        store.get_chunk(c(0, 1), true);
        store.get_chunk(c(0, 2), true);
        let path = store.persistence().chunk_path(c(0, 1));
        assert!(path.to_string_lossy().ends_with(".json"));
        let text = std::fs::read_to_string(path).expect("read record");
        assert!(text.contains("\"chunk_x\""));
    }

    #[test]
    fn test_unsaveable_victim_keeps_chunk_and_detaches() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").expect("write blocker");
        let store = store_at(blocker.join("saves"), 1, RecordFormat::Binary);

        store.get_chunk(c(20, 20), true);
        let detached = store.get_chunk(c(21, 20), true).expect("served detached");
        assert!(!detached.is_resident());
        assert!(store.is_resident(c(20, 20)));
        assert_eq!(store.resident_count(), 1);
        assert!(store.stats().persist_failures > 0);

        let world = store.mapper().chunk_to_world(c(21, 20));
        assert!(store.set_tile(world, store.get_tile(world)).is_err());
        assert!(store.unload_all().is_err());
        assert!(store.is_resident(c(20, 20)));
    }

    #[test]
    fn test_preload_shapes() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 50);
        assert_eq!(store.preload_area(c(0, 0), 2, AreaShape::Square), 25);
        assert_eq!(store.preload_area(c(10, 10), 2, AreaShape::Diamond), 13);
        assert_eq!(store.preload_area(c(0, 0), 1, AreaShape::Square), 0);
    }

    #[test]
    fn test_chunks_in_area() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 16);
        let chunks = store.get_chunks_in_area(WorldCoord::new(-1, -1), 10, 2);
        let coords: Vec<ChunkCoord> = chunks.iter().map(Chunk::coord).collect();
        assert_eq!(coords, vec![c(-1, -1), c(0, -1), c(1, -1), c(-1, 0), c(0, 0), c(1, 0)]);
        assert!(store.get_chunks_in_area(WorldCoord::new(0, 0), 0, 5).is_empty());
    }

    #[test]
    fn test_unload_all_persists_everything() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 8);
        store.preload_area(c(3, 3), 1, AreaShape::Square);
        assert_eq!(store.unload_all().expect("unload"), 9);
        assert_eq!(store.resident_count(), 0);
        for coord in c(3, 3).square(1) {
            assert!(store.persistence().exists(coord));
        }
    }

    #[test]
    fn test_address_index_follows_updates() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 2);
        let spot = WorldCoord::new(100, 100);
        let shop = TileAddress::object("w", "plains", "chunk_12_12", "shop");
        store
            .update_tile(spot, |tile| tile.address = shop.clone())
            .expect("update");
        assert!(store.address_tiles(&shop).contains(&spot));

        store.get_chunk(c(-30, -30), true);
        store.get_chunk(c(-31, -30), true);
        assert!(!store.is_resident(c(12, 12)));
        assert!(store.address_tiles(&shop).contains(&spot));
        assert!(store.address_tiles(&TileAddress::object("w", "x", "y", "z")).is_empty());
    }

    fn generated_building(store: &ChunkStore) -> (ChunkCoord, Tile) {
        (0..64)
            .flat_map(|y| (0..64).map(move |x| c(x, y)))
            .find_map(|coord| {
                let chunk = store.generator().generate_chunk(coord);
                chunk
                    .tiles()
                    .iter()
                    .find(|t| t.address.object.is_some())
                    .cloned()
                    .map(|tile| (coord, tile))
            })
            .expect("a generated building nearby")
    }

    fn resident_keys(store: &ChunkStore) -> HashSet<String> {
        store
            .resident_coords()
            .into_iter()
            .flat_map(|coord| {
                store.with_chunk(coord, |chunk| {
                    chunk
                        .tiles()
                        .iter()
                        .flat_map(|t| t.address.index_keys())
                        .collect::<Vec<_>>()
                })
            })
            .collect()
    }

    #[test]
    fn test_generated_addresses_follow_residency() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 2);
        let (coord, building) = generated_building(&store);

        store.get_chunk(coord, true).expect("chunk");
        assert!(store.address_tiles(&building.address).contains(&building.coord));

        assert!(store.evict(coord));
        assert!(store.address_tiles(&building.address).is_empty());

        store.get_chunk(coord, true).expect("chunk");
        assert!(store.address_tiles(&building.address).contains(&building.coord));
    }

    #[test]
    fn test_address_index_bounded_by_residency() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 4);
        for step in 0..400 {
            store.get_chunk(c(step % 40, step / 40), true).expect("chunk");
            assert_eq!(store.addresses().len(), resident_keys(&store).len());
        }
        assert_eq!(store.resident_count(), 4);
    }

    #[test]
    fn test_empty_slot_served_from_record() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 4);
        let spot = WorldCoord::new(3, 3);
        store
            .update_tile(spot, |tile| tile.add_event(TileEvent::triple("eve", "left", "a note")))
            .expect("update");
        assert_eq!(store.flush(), 1);
        {
            let mut state = store.state.write();
            let slot = *state.index.get(&c(0, 0)).expect("resident");
            state.slots[slot] = None;
        }

        let kept = store.with_chunk(c(0, 0), |chunk| {
            chunk
                .tile(atlas_common::LocalCoord::new(3, 3))
                .events()
                .iter()
                .any(|e| e.subject == "eve")
        });
        assert!(kept);
    }

    #[test]
    fn test_with_chunk_mut_reindexes_and_pins_coords() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir, 2);
        let gate = TileAddress::object("w", "plains", "chunk_0_0", "gate");
        store
            .with_chunk_mut(c(0, 0), |chunk| {
                let first = &mut chunk.tiles_mut()[0];
                first.address = gate.clone();
                first.coord = WorldCoord::new(999, 999);
            })
            .expect("mutate");

        assert!(store.address_tiles(&gate).contains(&WorldCoord::new(0, 0)));
        assert_eq!(store.get_tile(WorldCoord::new(0, 0)).coord, WorldCoord::new(0, 0));
        assert!(store.with_chunk(c(0, 0), Chunk::is_dirty));
    }

    #[test]
    fn test_concurrent_mutations_are_kept() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(store(&dir, 3));
        std::thread::scope(|scope| {
            for worker in 0..4i64 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for step in 0..12i64 {
                        let spot = WorldCoord::new(step * 8, worker * 8);
                        store
                            .update_tile(spot, |tile| {
                                tile.add_event(TileEvent::triple(format!("w{worker}"), "visited", "tile"))
                            })
                            .expect("update");
                        assert!(store.resident_count() <= 3);
                    }
                });
            }
        });
        for worker in 0..4i64 {
            for step in 0..12i64 {
                let tile = store.get_tile(WorldCoord::new(step * 8, worker * 8));
                assert_eq!(tile.events().len(), 1, "lost event at step {step} worker {worker}");
            }
        }
    }
}
