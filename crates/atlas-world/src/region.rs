//! Active regions: the chunks kept hot around tracked agents.

use ahash::AHashMap;
use atlas_common::{AgentId, ChunkCoord, ConfigError, CoordinateMapper, WorldCoord};
use tracing::debug;

/// Chunks that changed state after an agent moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionDelta {
    /// Chunks that entered the active set
    pub activated: Vec<ChunkCoord>,
    /// Chunks that left the active set
    pub released: Vec<ChunkCoord>,
}

impl RegionDelta {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.released.is_empty()
    }
}

/// Reference-counted union of every agent's K×K chunk neighborhood.
#[derive(Debug, Clone)]
pub struct ActiveRegionTracker {
    mapper: CoordinateMapper,
    region_size: u32,
    refcounts: AHashMap<ChunkCoord, u32>,
    agents: AHashMap<AgentId, ChunkCoord>,
}

impl ActiveRegionTracker {
    /// Creates a tracker with a `region_size`×`region_size` neighborhood.
    /// The size must be a positive odd number so the agent's chunk is the center.
    pub fn new(mapper: CoordinateMapper, region_size: u32) -> Result<Self, ConfigError> {
        if region_size == 0 || region_size % 2 == 0 {
            return Err(ConfigError::InvalidRegionSize(region_size));
        }
        Ok(Self {
            mapper,
            region_size,
            refcounts: AHashMap::new(),
            agents: AHashMap::new(),
        })
    }

    /// Neighborhood width in chunks.
    #[must_use]
    pub const fn region_size(&self) -> u32 {
        self.region_size
    }

    fn neighborhood(&self, center: ChunkCoord) -> impl Iterator<Item = ChunkCoord> {
        center.square(self.region_size / 2)
    }

    /// Moves `agent` to `position`. A move within the same chunk is a no-op.
    pub fn update_agent_position(&mut self, agent: &AgentId, position: WorldCoord) -> RegionDelta {
        let chunk = self.mapper.world_to_chunk(position);
        let previous = self.agents.insert(agent.clone(), chunk);
        if previous == Some(chunk) {
            return RegionDelta::default();
        }

        let mut delta = RegionDelta::default();
        for coord in self.neighborhood(chunk).collect::<Vec<_>>() {
            let count = self.refcounts.entry(coord).or_insert(0);
            *count += 1;
            if *count == 1 {
                delta.activated.push(coord);
            }
        }
        if let Some(old) = previous {
            delta.released = self.release(old);
        }
        debug!(
            "Agent {agent} entered chunk {chunk}: {} activated, {} released",
            delta.activated.len(),
            delta.released.len()
        );
        delta
    }

    /// Stops tracking `agent`, returning the chunks that left the active set.
    pub fn remove_agent(&mut self, agent: &AgentId) -> Vec<ChunkCoord> {
        match self.agents.remove(agent) {
            Some(chunk) => self.release(chunk),
            None => Vec::new(),
        }
    }

    fn release(&mut self, center: ChunkCoord) -> Vec<ChunkCoord> {
        let mut released = Vec::new();
        for coord in self.neighborhood(center).collect::<Vec<_>>() {
            if let Some(count) = self.refcounts.get_mut(&coord) {
                *count -= 1;
                if *count == 0 {
                    self.refcounts.remove(&coord);
                    released.push(coord);
                }
            }
        }
        released
    }

    /// Whether `coord` lies in some agent's neighborhood.
    #[must_use]
    pub fn is_active(&self, coord: ChunkCoord) -> bool {
        self.refcounts.contains_key(&coord)
    }

    /// Every active chunk, in no particular order.
    #[must_use]
    pub fn active_chunks(&self) -> Vec<ChunkCoord> {
        self.refcounts.keys().copied().collect()
    }

    /// Number of active chunks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.refcounts.len()
    }

    /// Last known chunk of `agent`.
    #[must_use]
    pub fn agent_chunk(&self, agent: &AgentId) -> Option<ChunkCoord> {
        self.agents.get(agent).copied()
    }

    /// Number of tracked agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Whether any agent is within `keep_distance` chunks (Chebyshev) of `coord`.
    #[must_use]
    pub fn is_within_keep_distance(&self, coord: ChunkCoord, keep_distance: u32) -> bool {
        self.agents
            .values()
            .any(|&chunk| chunk.chebyshev(coord) <= keep_distance)
    }
}
