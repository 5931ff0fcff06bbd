//! Address index: which world coordinates carry a given tile address.
//!
//! Generated addresses are indexed only while their chunk is resident; they
//! are dropped on eviction and rebuilt from the chunk when it comes back.
//! Tiles whose address was changed explicitly are pinned and stay indexed
//! after eviction. The index is therefore bounded by the cache capacity plus
//! the number of explicitly addressed tiles, however far agents travel.

use std::collections::HashSet;

use atlas_common::WorldCoord;
use dashmap::{DashMap, DashSet};

use crate::tile::{Tile, TileAddress};

/// Concurrent map from flattened address keys to tile coordinates.
#[derive(Debug, Default)]
pub struct AddressIndex {
    entries: DashMap<String, HashSet<WorldCoord>>,
    pinned: DashSet<WorldCoord>,
}

impl AddressIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the tiles of a chunk that became resident.
    pub fn insert_tiles(&self, tiles: &[Tile]) {
        for tile in tiles {
            self.insert(tile.coord, &tile.address);
        }
    }

    /// Drops the entries of a chunk leaving residency. Pinned tiles are kept.
    pub fn release_tiles(&self, tiles: &[Tile]) {
        for tile in tiles.iter().filter(|t| !self.pinned.contains(&t.coord)) {
            self.remove(tile.coord, &tile.address);
        }
    }

    /// Records `coord` under every indexed prefix of `address`.
    pub fn insert(&self, coord: WorldCoord, address: &TileAddress) {
        for key in address.index_keys() {
            self.entries.entry(key).or_default().insert(coord);
        }
    }

    /// Forgets `coord` under every indexed prefix of `address`.
    pub fn remove(&self, coord: WorldCoord, address: &TileAddress) {
        for key in address.index_keys() {
            let now_empty = match self.entries.get_mut(&key) {
                Some(mut coords) => {
                    coords.remove(&coord);
                    coords.is_empty()
                },
                None => false,
            };
            if now_empty {
                self.entries.remove_if(&key, |_, coords| coords.is_empty());
            }
        }
    }

    /// Re-indexes a tile whose address changed and pins it.
    pub fn replace(&self, coord: WorldCoord, old: &TileAddress, new: &TileAddress) {
        if old != new {
            self.remove(coord, old);
            self.insert(coord, new);
            self.pinned.insert(coord);
        }
    }

    /// Whether `coord` had its address changed explicitly.
    #[must_use]
    pub fn is_pinned(&self, coord: WorldCoord) -> bool {
        self.pinned.contains(&coord)
    }

    /// Coordinates carrying `address` (matched on its full present prefix).
    #[must_use]
    pub fn lookup(&self, address: &TileAddress) -> HashSet<WorldCoord> {
        address
            .full_key()
            .map(|key| self.lookup_key(&key))
            .unwrap_or_default()
    }

    /// Coordinates stored under a flattened `a:b:c` key.
    #[must_use]
    pub fn lookup_key(&self, key: &str) -> HashSet<WorldCoord> {
        self.entries
            .get(key)
            .map(|coords| coords.value().clone())
            .unwrap_or_default()
    }

    /// Number of distinct address keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{Biome, TerrainKind};

    #[test]
    fn test_insert_lookup_remove() {
        let index = AddressIndex::new();
        let well = TileAddress::object("w", "village", "chunk_0_0", "well");
        index.insert(WorldCoord::new(1, 1), &well);
        index.insert(WorldCoord::new(1, 2), &well);

        assert_eq!(index.lookup(&well).len(), 2);
        assert_eq!(index.lookup_key("w:village").len(), 2);
        assert_eq!(index.len(), 3);

        index.remove(WorldCoord::new(1, 1), &well);
        assert_eq!(index.lookup(&well), HashSet::from([WorldCoord::new(1, 2)]));

        index.remove(WorldCoord::new(1, 2), &well);
        assert!(index.is_empty());
    }

    #[test]
    fn test_world_level_not_indexed() {
        let index = AddressIndex::new();
        let mut tile = Tile::new(WorldCoord::new(0, 0), TerrainKind::Grass, Biome::Plains);
        tile.address = TileAddress::world("w");
        index.insert_tiles(std::slice::from_ref(&tile));
        assert!(index.is_empty());
        assert!(index.lookup(&TileAddress::world("w")).is_empty());
    }

    #[test]
    fn test_replace_moves_entry() {
        let index = AddressIndex::new();
        let coord = WorldCoord::new(-4, 9);
        let house = TileAddress::object("w", "s", "a", "house");
        let shop = TileAddress::object("w", "s", "a", "shop");
        index.insert(coord, &house);
        index.replace(coord, &house, &shop);
        assert!(index.lookup(&house).is_empty());
        assert!(index.lookup(&shop).contains(&coord));
        assert!(index.lookup_key("w:s:a").contains(&coord));
        assert!(index.is_pinned(coord));
    }

    #[test]
    fn test_release_keeps_pinned_tiles() {
        let index = AddressIndex::new();
        let well = TileAddress::object("w", "village", "chunk_0_0", "well");
        let tiles: Vec<Tile> = (0..3)
            .map(|x| {
                let mut tile = Tile::new(WorldCoord::new(x, 0), TerrainKind::Grass, Biome::Village);
                tile.address = well.clone();
                tile
            })
            .collect();
        index.insert_tiles(&tiles);

        let renamed = TileAddress::object("w", "village", "chunk_0_0", "inn");
        index.replace(WorldCoord::new(2, 0), &well, &renamed);
        let mut after = tiles.clone();
        after[2].address = renamed.clone();

        index.release_tiles(&after);
        assert!(index.lookup(&well).is_empty());
        assert_eq!(index.lookup(&renamed), HashSet::from([WorldCoord::new(2, 0)]));
        assert_eq!(index.lookup_key("w:village").len(), 1);
    }
}
