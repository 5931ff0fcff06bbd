//! Tile data: terrain, collision, hierarchical address, features and events.

use std::collections::BTreeMap;
use std::fmt;

use atlas_common::WorldCoord;
use serde::{Deserialize, Serialize};

/// Terrain classification derived from elevation, moisture and temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Biome {
    /// Open grassland
    Plains,
    /// Dense trees
    Forest,
    /// Hot and dry
    Desert,
    /// High elevation rock
    Mountains,
    /// Low elevation, impassable
    Water,
    /// Settlement with buildings
    Village,
    /// Cultivated fields
    Farmland,
    /// Dense settlement core
    Urban,
}

impl Biome {
    /// Lowercase name, as used in records and addresses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plains => "plains",
            Self::Forest => "forest",
            Self::Desert => "desert",
            Self::Mountains => "mountains",
            Self::Water => "water",
            Self::Village => "village",
            Self::Farmland => "farmland",
            Self::Urban => "urban",
        }
    }

    /// Whether agents prefer to start in this biome.
    #[must_use]
    pub const fn is_spawn_preferred(self) -> bool {
        matches!(self, Self::Village | Self::Plains | Self::Farmland)
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ground material of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    /// Grass
    Grass,
    /// Open water
    Water,
    /// Sand
    Sand,
    /// Bare rock
    Rock,
    /// Paved village path
    StonePath,
    /// Tilled soil
    Farmland,
    /// City pavement
    Pavement,
}

/// Kinds of buildings stamped into settlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingKind {
    /// Dwelling
    House,
    /// Trading post
    Shop,
    /// Water well
    Well,
    /// Urban block
    Block,
}

impl BuildingKind {
    /// Lowercase name, used as the object level of the tile address.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::House => "house",
            Self::Shop => "shop",
            Self::Well => "well",
            Self::Block => "block",
        }
    }
}

/// Kinds of crops grown on farmland.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropKind {
    /// Wheat
    Wheat,
    /// Corn
    Corn,
    /// Mixed vegetables
    Vegetables,
}

/// Small decorative props.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecorationKind {
    /// Flower
    Flower,
    /// Rock
    Rock,
    /// Bush
    Bush,
    /// Cactus (blocks movement)
    Cactus,
}

/// A feature placed on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileFeature {
    /// A tree
    Tree,
    /// A building
    Building(BuildingKind),
    /// A crop
    Crop(CropKind),
    /// A decoration
    Decoration(DecorationKind),
}

impl TileFeature {
    /// Numeric id used by the `features` layer of map exports (0 means none).
    #[must_use]
    pub const fn layer_id(self) -> u32 {
        match self {
            Self::Tree => 1,
            Self::Building(kind) => 10 + kind as u32,
            Self::Crop(kind) => 20 + kind as u32,
            Self::Decoration(kind) => 30 + kind as u32,
        }
    }
}

/// Scalar value of an open-ended feature key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Free text
    Text(String),
}

/// Level of a [`TileAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressLevel {
    /// World name
    World,
    /// Sector within the world
    Sector,
    /// Arena within the sector
    Arena,
    /// Game object within the arena
    Object,
}

impl AddressLevel {
    /// Number of levels up to and including this one.
    #[must_use]
    pub const fn depth(self) -> usize {
        self as usize + 1
    }
}

/// Hierarchical `world:sector:arena:object` address of a tile.
///
/// Levels are meaningful only as a prefix: a level is considered present when
/// it and every level above it are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    /// World name
    pub world: Option<String>,
    /// Sector name
    pub sector: Option<String>,
    /// Arena name
    pub arena: Option<String>,
    /// Object name
    pub object: Option<String>,
}

impl TileAddress {
    /// Separator used when an address is flattened to a string key.
    pub const SEPARATOR: char = ':';

    /// Creates a fully-qualified object address.
    #[must_use]
    pub fn object(
        world: impl Into<String>,
        sector: impl Into<String>,
        arena: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            world: Some(world.into()),
            sector: Some(sector.into()),
            arena: Some(arena.into()),
            object: Some(object.into()),
        }
    }

    /// Creates an address with only the world level set.
    #[must_use]
    pub fn world(world: impl Into<String>) -> Self {
        Self {
            world: Some(world.into()),
            ..Self::default()
        }
    }

    /// Parses a `:`-separated address; extra segments are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut parts = text
            .split(Self::SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        Self {
            world: parts.next(),
            sector: parts.next(),
            arena: parts.next(),
            object: parts.next(),
        }
    }

    fn slot(&self, level: AddressLevel) -> Option<&String> {
        match level {
            AddressLevel::World => self.world.as_ref(),
            AddressLevel::Sector => self.sector.as_ref(),
            AddressLevel::Arena => self.arena.as_ref(),
            AddressLevel::Object => self.object.as_ref(),
        }
    }

    /// Number of present leading levels (0..=4).
    #[must_use]
    pub fn depth(&self) -> usize {
        [
            AddressLevel::World,
            AddressLevel::Sector,
            AddressLevel::Arena,
            AddressLevel::Object,
        ]
        .into_iter()
        .take_while(|level| self.slot(*level).is_some())
        .count()
    }

    /// Returns the name at a level when that level is present.
    #[must_use]
    pub fn get(&self, level: AddressLevel) -> Option<&str> {
        if self.depth() >= level.depth() {
            self.slot(level).map(String::as_str)
        } else {
            None
        }
    }

    /// Whether the address reaches the given level.
    #[must_use]
    pub fn has(&self, level: AddressLevel) -> bool {
        self.depth() >= level.depth()
    }

    /// Flattened key of the prefix ending at `level`, if present.
    #[must_use]
    pub fn key(&self, level: AddressLevel) -> Option<String> {
        if !self.has(level) {
            return None;
        }
        let parts: Vec<&str> = [
            AddressLevel::World,
            AddressLevel::Sector,
            AddressLevel::Arena,
            AddressLevel::Object,
        ]
        .into_iter()
        .take(level.depth())
        .filter_map(|l| self.slot(l).map(String::as_str))
        .collect();
        Some(parts.join(":"))
    }

    /// Flattened key of the whole present prefix.
    #[must_use]
    pub fn full_key(&self) -> Option<String> {
        match self.depth() {
            0 => None,
            1 => self.key(AddressLevel::World),
            2 => self.key(AddressLevel::Sector),
            3 => self.key(AddressLevel::Arena),
            _ => self.key(AddressLevel::Object),
        }
    }

    /// Keys of every indexed prefix: sector, arena and object levels.
    /// The bare world level is shared by all tiles and is not indexed.
    #[must_use]
    pub fn index_keys(&self) -> Vec<String> {
        [AddressLevel::Sector, AddressLevel::Arena, AddressLevel::Object]
            .into_iter()
            .filter_map(|level| self.key(level))
            .collect()
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_key().unwrap_or_default())
    }
}

/// A `subject predicate object` event attached to a tile by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileEvent {
    /// Who or what the event is about
    pub subject: String,
    /// Relation, e.g. "is"
    pub predicate: Option<String>,
    /// Target of the relation, e.g. "idle"
    pub object: Option<String>,
    /// Address of the object the event refers to
    pub address: Option<TileAddress>,
    /// Free-form description
    pub description: Option<String>,
}

impl TileEvent {
    /// Creates an event with only a subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            predicate: None,
            object: None,
            address: None,
            description: None,
        }
    }

    /// Creates a full `subject predicate object` triple.
    #[must_use]
    pub fn triple(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            predicate: Some(predicate.into()),
            object: Some(object.into()),
            ..Self::new(subject)
        }
    }

    /// Sets the address the event refers to.
    #[must_use]
    pub fn with_address(mut self, address: TileAddress) -> Self {
        self.address = Some(address);
        self
    }
}

impl fmt::Display for TileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.subject,
            self.predicate.as_deref().unwrap_or("is"),
            self.object.as_deref().unwrap_or("idle")
        )
    }
}

/// A single grid cell of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// World coordinate
    pub coord: WorldCoord,
    /// Ground material
    pub terrain: TerrainKind,
    /// Biome the tile was classified into
    pub biome: Biome,
    /// Whether the tile blocks movement
    pub collision: bool,
    /// Elevation in `[0, 1]`
    pub elevation: f32,
    /// Moisture in `[0, 1]`
    pub moisture: f32,
    /// Temperature in `[0, 1]`
    pub temperature: f32,
    /// Render tile id
    pub tile_id: u16,
    /// Hierarchical address
    #[serde(default)]
    pub address: TileAddress,
    /// Known features
    #[serde(default)]
    pub features: Vec<TileFeature>,
    /// Feature keys not covered by [`TileFeature`]
    #[serde(default)]
    pub extra: BTreeMap<String, FeatureValue>,
    /// Attached events, in insertion order, without duplicates
    #[serde(default)]
    events: Vec<TileEvent>,
}

impl Tile {
    /// Creates a passable tile with neutral scalars and no features.
    #[must_use]
    pub fn new(coord: WorldCoord, terrain: TerrainKind, biome: Biome) -> Self {
        Self {
            coord,
            terrain,
            biome,
            collision: false,
            elevation: 0.5,
            moisture: 0.5,
            temperature: 0.5,
            tile_id: 0,
            address: TileAddress::default(),
            features: Vec::new(),
            extra: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Adds a feature if not already present.
    pub fn add_feature(&mut self, feature: TileFeature) {
        if !self.features.contains(&feature) {
            self.features.push(feature);
        }
    }

    /// The building on this tile, if any.
    #[must_use]
    pub fn building(&self) -> Option<BuildingKind> {
        self.features.iter().find_map(|f| match f {
            TileFeature::Building(kind) => Some(*kind),
            _ => None,
        })
    }

    /// Id of the first feature for map exports, 0 when bare.
    #[must_use]
    pub fn feature_layer_id(&self) -> u32 {
        self.features.first().map_or(0, |f| f.layer_id())
    }

    /// Attached events.
    #[must_use]
    pub fn events(&self) -> &[TileEvent] {
        &self.events
    }

    /// Attaches an event. Returns `false` if an identical event is already attached.
    pub fn add_event(&mut self, event: TileEvent) -> bool {
        if self.events.contains(&event) {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Removes every event with the given subject, returning them.
    pub fn remove_events(&mut self, subject: &str) -> Vec<TileEvent> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| e.subject == subject);
        self.events = kept;
        removed
    }

    /// Replaces every event whose subject matches `event.subject`.
    /// Returns the number of replaced events.
    pub fn update_events(&mut self, event: &TileEvent) -> usize {
        let mut replaced = 0;
        for slot in self.events.iter_mut().filter(|e| e.subject == event.subject) {
            slot.clone_from(event);
            replaced += 1;
        }
        if replaced > 1 {
            // replacing several events with the same value leaves duplicates
            let mut seen = Vec::with_capacity(self.events.len());
            self.events.retain(|e| {
                if seen.contains(e) {
                    false
                } else {
                    seen.push(e.clone());
                    true
                }
            });
        }
        replaced
    }

    /// Replaces events by subject, or attaches the event when none matched.
    pub fn upsert_event(&mut self, event: TileEvent) {
        if self.update_events(&event) == 0 {
            self.add_event(event);
        }
    }

    /// A tile with no address below the world level and no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.address.depth() <= 1 && self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grass() -> Tile {
        Tile::new(WorldCoord::new(3, 4), TerrainKind::Grass, Biome::Plains)
    }

    #[test]
    fn test_address_prefix_semantics() {
        let address = TileAddress::object("the Ville", "village", "chunk_0_0", "well");
        assert_eq!(address.depth(), 4);
        assert_eq!(address.get(AddressLevel::Object), Some("well"));
        assert_eq!(
            address.index_keys(),
            vec![
                "the Ville:village".to_string(),
                "the Ville:village:chunk_0_0".to_string(),
                "the Ville:village:chunk_0_0:well".to_string(),
            ]
        );

        let gap = TileAddress {
            world: Some("w".into()),
            sector: None,
            arena: Some("a".into()),
            object: None,
        };
        assert_eq!(gap.depth(), 1);
        assert!(!gap.has(AddressLevel::Arena));
        assert_eq!(gap.get(AddressLevel::Arena), None);
    }

    #[test]
    fn test_address_parse_display() {
        let address = TileAddress::parse("w:s:a:o");
        assert_eq!(address, TileAddress::object("w", "s", "a", "o"));
        assert_eq!(address.to_string(), "w:s:a:o");
        assert_eq!(TileAddress::parse("w:s").depth(), 2);
    }

    #[test]
    fn test_event_dedup_and_remove() {
        let mut tile = grass();
        let sleeping = TileEvent::triple("Klaus", "is", "sleeping");
        assert!(tile.add_event(sleeping.clone()));
        assert!(!tile.add_event(sleeping.clone()));
        tile.add_event(TileEvent::triple("Maria", "is", "reading"));
        assert_eq!(tile.events().len(), 2);

        let removed = tile.remove_events("Klaus");
        assert_eq!(removed, vec![sleeping]);
        assert_eq!(tile.events().len(), 1);
    }

    #[test]
    fn test_update_and_upsert() {
        let mut tile = grass();
        assert_eq!(tile.update_events(&TileEvent::triple("bed", "is", "used")), 0);

        tile.upsert_event(TileEvent::triple("bed", "is", "idle"));
        tile.upsert_event(TileEvent::triple("bed", "is", "used"));
        assert_eq!(tile.events().len(), 1);
        assert_eq!(tile.events()[0].object.as_deref(), Some("used"));
    }

    #[test]
    fn test_feature_set() {
        let mut tile = grass();
        tile.add_feature(TileFeature::Decoration(DecorationKind::Flower));
        tile.add_feature(TileFeature::Decoration(DecorationKind::Flower));
        assert_eq!(tile.features.len(), 1);
        assert_eq!(tile.feature_layer_id(), 30);
        assert_eq!(tile.building(), None);
        assert!(tile.is_empty());
    }
}
