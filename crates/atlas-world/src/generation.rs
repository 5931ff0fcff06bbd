//! Procedural world generation.
//!
//! Every value a tile gets is a pure function of the world seed and the
//! tile's world coordinate:
//! - four fBm noise channels (elevation, moisture, temperature, settlement),
//!   each seeded from `(seed, channel index)`;
//! - a per-tile RNG seeded from `(seed, world x, world y)` for decorations.
//!
//! Nothing depends on the order in which chunks are generated, so a chunk
//! regenerated after eviction is bit-identical to the first one.

use atlas_common::{ChunkCoord, ConfigError, CoordinateMapper, LocalCoord, WorldCoord};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use tracing::debug;

use crate::chunk::Chunk;
use crate::tile::{
    Biome, BuildingKind, CropKind, DecorationKind, TerrainKind, Tile, TileAddress, TileEvent,
    TileFeature,
};

/// Parameters of one fBm noise channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseChannel {
    /// Base frequency in cycles per tile
    pub frequency: f64,
    /// Number of octaves
    pub octaves: usize,
    /// Amplitude falloff per octave
    pub persistence: f64,
}

impl NoiseChannel {
    /// Creates a channel description.
    #[must_use]
    pub const fn new(frequency: f64, octaves: usize, persistence: f64) -> Self {
        Self {
            frequency,
            octaves,
            persistence,
        }
    }

    fn build(self, seed: u32) -> Fbm<Perlin> {
        Fbm::<Perlin>::new(seed)
            .set_octaves(self.octaves)
            .set_frequency(self.frequency)
            .set_persistence(self.persistence)
    }
}

/// Chunk size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: u32 = 32;

/// World generator configuration.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// World seed
    pub seed: u64,
    /// Chunk size in tiles
    pub chunk_size: u32,
    /// World name, the first level of every tile address
    pub world_name: String,
    /// Chunks within this Chebyshev radius of the origin are flat, open plains
    pub safe_origin_radius: Option<u32>,
    /// Elevation channel
    pub elevation: NoiseChannel,
    /// Moisture channel
    pub moisture: NoiseChannel,
    /// Temperature channel
    pub temperature: NoiseChannel,
    /// Settlement channel (villages, farmland, towns)
    pub settlement: NoiseChannel,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            chunk_size: DEFAULT_CHUNK_SIZE,
            world_name: "the Infinite World".to_string(),
            safe_origin_radius: None,
            elevation: NoiseChannel::new(0.02, 4, 0.5),
            moisture: NoiseChannel::new(0.03, 3, 0.6),
            temperature: NoiseChannel::new(0.01, 2, 0.4),
            settlement: NoiseChannel::new(0.015, 2, 0.5),
        }
    }
}

impl GeneratorConfig {
    /// Creates a default config with the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }
}

/// Noise channel indices, used to derive per-channel seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Channel {
    /// Height above sea level
    Elevation = 0,
    /// Wetness
    Moisture = 1,
    /// Warmth
    Temperature = 2,
    /// Likelihood of settlement
    Settlement = 3,
}

/// Climate scalars sampled at one world coordinate, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// Elevation
    pub elevation: f64,
    /// Moisture
    pub moisture: f64,
    /// Temperature
    pub temperature: f64,
    /// Settlement density
    pub settlement: f64,
}

/// SplitMix64 finalizer.
const fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of a noise channel, derived from the world seed and channel index.
#[must_use]
pub const fn channel_seed(seed: u64, channel: Channel) -> u32 {
    (mix64(seed ^ mix64(channel as u64 + 1)) >> 32) as u32
}

/// Seed of the per-tile RNG, derived from the world seed and tile position.
#[must_use]
pub const fn tile_seed(seed: u64, x: i64, y: i64) -> u64 {
    mix64(seed ^ mix64((x as u64) ^ mix64(y as u64).rotate_left(23)))
}

/// Procedural world generator.
pub struct TerrainGenerator {
    /// Configuration
    config: GeneratorConfig,
    mapper: CoordinateMapper,
    elevation: Fbm<Perlin>,
    moisture: Fbm<Perlin>,
    temperature: Fbm<Perlin>,
    settlement: Fbm<Perlin>,
}

impl std::fmt::Debug for TerrainGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TerrainGenerator {
    /// Creates a new generator with the given config. Fails if the chunk
    /// size is zero or larger than a local coordinate can address.
    pub fn new(config: GeneratorConfig) -> Result<Self, ConfigError> {
        let mapper = CoordinateMapper::try_new(config.chunk_size)?;
        Ok(Self::build(config, mapper))
    }

    /// Creates a generator with default config.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::build(
            GeneratorConfig::with_seed(seed),
            CoordinateMapper::new(DEFAULT_CHUNK_SIZE),
        )
    }

    fn build(config: GeneratorConfig, mapper: CoordinateMapper) -> Self {
        let seed = config.seed;
        Self {
            mapper,
            elevation: config.elevation.build(channel_seed(seed, Channel::Elevation)),
            moisture: config.moisture.build(channel_seed(seed, Channel::Moisture)),
            temperature: config
                .temperature
                .build(channel_seed(seed, Channel::Temperature)),
            settlement: config
                .settlement
                .build(channel_seed(seed, Channel::Settlement)),
            config,
        }
    }

    /// Returns the generator configuration.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Returns the coordinate mapper for the configured chunk size.
    #[must_use]
    pub const fn mapper(&self) -> CoordinateMapper {
        self.mapper
    }

    /// Generates a chunk at the given coordinate.
    #[must_use]
    pub fn generate_chunk(&self, coord: ChunkCoord) -> Chunk {
        if self.is_safe_chunk(coord) {
            return self.generate_safe_chunk(coord);
        }

        let size = self.config.chunk_size;
        let tiles: Vec<Tile> = (0..(size * size) as usize)
            .map(|index| {
                let world = self
                    .mapper
                    .local_to_world(coord, LocalCoord::from_index(index, size));
                let climate = self.sample(world);
                self.stamp_tile(world, coord, Self::classify(climate), climate)
            })
            .collect();

        let center = self
            .mapper
            .chunk_to_world(coord)
            .offset(i64::from(size / 2), i64::from(size / 2));
        let biome = Self::classify(self.sample(center));

        debug!("Generated chunk {coord} ({biome})");
        Chunk::from_tiles(coord, size, biome, tiles)
    }

    /// Generates an all-plains, collision-free chunk.
    #[must_use]
    pub fn generate_safe_chunk(&self, coord: ChunkCoord) -> Chunk {
        let size = self.config.chunk_size;
        let edge = size.saturating_sub(1) as u16;
        let tiles = (0..(size * size) as usize)
            .map(|index| {
                let local = LocalCoord::from_index(index, size);
                let world = self.mapper.local_to_world(coord, local);
                let mut tile = Tile::new(world, TerrainKind::Grass, Biome::Plains);
                tile.tile_id = 1 + (local.x + local.y) % 4;
                tile.address = TileAddress::world(&self.config.world_name);

                let on_border = local.x == 0 || local.y == 0 || local.x == edge || local.y == edge;
                if on_border {
                    let mut rng = self.tile_rng(world);
                    if rng.f32() < 0.3 {
                        let decoration = if rng.bool() {
                            DecorationKind::Flower
                        } else {
                            DecorationKind::Bush
                        };
                        tile.add_feature(TileFeature::Decoration(decoration));
                    }
                }
                tile
            })
            .collect();

        debug!("Generated safe chunk {coord}");
        Chunk::from_tiles(coord, size, Biome::Plains, tiles)
    }

    fn is_safe_chunk(&self, coord: ChunkCoord) -> bool {
        self.config
            .safe_origin_radius
            .is_some_and(|radius| coord.chebyshev(ChunkCoord::new(0, 0)) <= radius)
    }

    /// Samples all climate channels at a world coordinate.
    #[must_use]
    pub fn sample(&self, world: WorldCoord) -> Climate {
        let point = [world.x as f64, world.y as f64];
        Climate {
            elevation: normalize(self.elevation.get(point)),
            moisture: normalize(self.moisture.get(point)),
            temperature: normalize(self.temperature.get(point)),
            settlement: normalize(self.settlement.get(point)),
        }
    }

    /// Classifies a climate sample into a biome.
    #[must_use]
    pub fn classify(climate: Climate) -> Biome {
        let Climate {
            elevation,
            moisture,
            temperature,
            settlement,
        } = climate;

        if elevation < 0.3 {
            return Biome::Water;
        }
        if elevation > 0.75 {
            return Biome::Mountains;
        }

        if temperature > 0.7 {
            match moisture {
                m if m < 0.3 => Biome::Desert,
                m if m < 0.6 => Biome::Plains,
                _ => Biome::Forest,
            }
        } else if temperature > 0.4 {
            match moisture {
                m if m < 0.4 => Biome::Plains,
                m if m < 0.7 => match settlement {
                    s if s > 0.92 => Biome::Urban,
                    s if s > 0.80 => Biome::Village,
                    s if s > 0.65 => Biome::Farmland,
                    _ => Biome::Plains,
                },
                _ => Biome::Forest,
            }
        } else if moisture < 0.5 {
            Biome::Plains
        } else {
            Biome::Forest
        }
    }

    fn tile_rng(&self, world: WorldCoord) -> fastrand::Rng {
        fastrand::Rng::with_seed(tile_seed(self.config.seed, world.x, world.y))
    }

    /// Builds one tile of the given biome, with features drawn from the
    /// tile's own RNG.
    #[must_use]
    pub fn stamp_tile(
        &self,
        world: WorldCoord,
        chunk: ChunkCoord,
        biome: Biome,
        climate: Climate,
    ) -> Tile {
        let mut rng = self.tile_rng(world);
        let terrain = match biome {
            Biome::Plains | Biome::Forest => TerrainKind::Grass,
            Biome::Desert => TerrainKind::Sand,
            Biome::Mountains => TerrainKind::Rock,
            Biome::Water => TerrainKind::Water,
            Biome::Village => TerrainKind::StonePath,
            Biome::Farmland => TerrainKind::Farmland,
            Biome::Urban => TerrainKind::Pavement,
        };

        let mut tile = Tile::new(world, terrain, biome);
        tile.elevation = climate.elevation as f32;
        tile.moisture = climate.moisture as f32;
        tile.temperature = climate.temperature as f32;
        tile.address = TileAddress::world(&self.config.world_name);

        match biome {
            Biome::Water => {
                tile.collision = true;
                tile.tile_id = 100;
            },
            Biome::Plains => {
                tile.tile_id = 1 + rng.u16(0..4);
                if rng.f32() < 0.1 {
                    let decoration = match rng.u8(0..3) {
                        0 => DecorationKind::Flower,
                        1 => DecorationKind::Rock,
                        _ => DecorationKind::Bush,
                    };
                    tile.add_feature(TileFeature::Decoration(decoration));
                }
            },
            Biome::Forest => {
                tile.tile_id = 5;
                if rng.f32() < 0.4 {
                    tile.add_feature(TileFeature::Tree);
                    tile.collision = true;
                }
            },
            Biome::Desert => {
                tile.tile_id = 20 + rng.u16(0..3);
                if rng.f32() < 0.05 {
                    tile.add_feature(TileFeature::Decoration(DecorationKind::Cactus));
                    tile.collision = true;
                }
            },
            Biome::Mountains => {
                tile.tile_id = 30 + rng.u16(0..4);
                tile.collision = climate.elevation > 0.8;
            },
            Biome::Village => {
                tile.tile_id = 50;
                if rng.f32() < 0.2 {
                    let building = match rng.u8(0..3) {
                        0 => BuildingKind::House,
                        1 => BuildingKind::Shop,
                        _ => BuildingKind::Well,
                    };
                    self.place_building(&mut tile, chunk, building);
                }
            },
            Biome::Farmland => {
                tile.tile_id = 60 + rng.u16(0..3);
                if rng.f32() < 0.7 {
                    let crop = match rng.u8(0..3) {
                        0 => CropKind::Wheat,
                        1 => CropKind::Corn,
                        _ => CropKind::Vegetables,
                    };
                    tile.add_feature(TileFeature::Crop(crop));
                }
            },
            Biome::Urban => {
                tile.tile_id = 70;
                if rng.f32() < 0.3 {
                    self.place_building(&mut tile, chunk, BuildingKind::Block);
                }
            },
        }

        tile
    }

    fn place_building(&self, tile: &mut Tile, chunk: ChunkCoord, building: BuildingKind) {
        let address = TileAddress::object(
            &self.config.world_name,
            tile.biome.as_str(),
            format!("chunk_{}_{}", chunk.x, chunk.y),
            building.as_str(),
        );
        tile.add_feature(TileFeature::Building(building));
        tile.collision = true;
        tile.add_event(TileEvent::new(building.as_str()).with_address(address.clone()));
        tile.address = address;
    }
}

fn normalize(value: f64) -> f64 {
    ((value + 1.0) / 2.0).clamp(0.0, 1.0)
}
