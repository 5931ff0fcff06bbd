//! Simulation driver.
//!
//! Spawns a handful of wandering agents, walks them along paths found by the
//! world, and ticks the world so maintenance and autosave run on schedule.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use atlas_common::{AgentId, WorldCoord};
use atlas_world::{InfiniteWorld, WorldStats};

use crate::config::EngineConfig;

/// An agent walking toward a randomly chosen target.
#[derive(Debug, Clone)]
struct Walker {
    id: AgentId,
    position: WorldCoord,
    route: VecDeque<WorldCoord>,
}

/// Driver state.
pub struct Simulation {
    config: EngineConfig,
    world: InfiniteWorld,
    walkers: Vec<Walker>,
    rng: fastrand::Rng,
    /// Routes that could not be found
    failed_routes: u64,
}

impl Simulation {
    /// Creates the world and places the agents on spawn locations.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let world = InfiniteWorld::new(config.world.clone()).context("failed to create world")?;

        let spawns = world.generate_spawn_locations(config.agents);
        if spawns.len() < config.agents {
            warn!(
                "Only {} of {} agents could be placed",
                spawns.len(),
                config.agents
            );
        }
        let walkers = spawns
            .into_iter()
            .enumerate()
            .map(|(i, position)| {
                let id = AgentId::new(format!("agent-{i}"));
                world.update_agent_position(&id, position);
                info!("Spawned {id} at {position}");
                Walker {
                    id,
                    position,
                    route: VecDeque::new(),
                }
            })
            .collect();

        Ok(Self {
            rng: fastrand::Rng::with_seed(config.driver_seed),
            config,
            world,
            walkers,
            failed_routes: 0,
        })
    }

    /// The simulated world.
    #[allow(dead_code)]
    pub fn world(&self) -> &InfiniteWorld {
        &self.world
    }

    /// Current agent positions.
    pub fn positions(&self) -> Vec<WorldCoord> {
        self.walkers.iter().map(|w| w.position).collect()
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) {
        let tick = self.world.tick();
        if tick % self.config.ticks_per_step == 0 {
            for index in 0..self.walkers.len() {
                self.advance_walker(index);
            }
        }
        if self.config.stats_interval > 0 && tick % self.config.stats_interval == 0 {
            log_stats(&self.world.get_stats());
        }
    }

    fn advance_walker(&mut self, index: usize) {
        let radius = self.config.wander_radius;
        let walker = &mut self.walkers[index];

        if walker.route.is_empty() {
            let target = walker.position.offset(
                self.rng.i64(-radius..=radius),
                self.rng.i64(-radius..=radius),
            );
            let path = self.world.find_path(walker.position, target);
            if path.is_empty() {
                self.failed_routes += 1;
                debug!("{} found no route to {target}", walker.id);
                return;
            }
            // the path starts on the walker's own tile
            walker.route = path.into_iter().skip(1).collect();
        }

        if let Some(next) = walker.route.pop_front() {
            walker.position = next;
            self.world.update_agent_position(&walker.id, next);
        }
    }

    /// Runs the configured number of ticks, exports the final view and shuts
    /// the world down.
    pub fn run(mut self) -> Result<WorldStats> {
        info!(
            "Simulating {} ticks with {} agents",
            self.config.ticks,
            self.walkers.len()
        );
        for _ in 0..self.config.ticks {
            self.step();
        }

        if let Some(path) = self.config.export_path.clone() {
            let center = self
                .walkers
                .first()
                .map_or_else(|| WorldCoord::new(0, 0), |w| w.position);
            self.world
                .export_current_view(center, self.config.export_radius, &path)
                .context("failed to export map view")?;
        }

        debug!("Final agent positions: {:?}", self.positions());
        let stats = self.world.get_stats();
        log_stats(&stats);
        if self.failed_routes > 0 {
            info!("{} wander targets were unreachable", self.failed_routes);
        }
        self.world.shutdown().context("failed to save world")?;
        Ok(stats)
    }
}

fn log_stats(stats: &WorldStats) {
    info!(
        "Tick {}: {} chunks resident, {} generated, {} loaded, {} evicted, hit rate {:.1}%",
        stats.ticks,
        stats.store.resident_count,
        stats.store.generated,
        stats.store.loaded,
        stats.store.evicted,
        stats.store.cache_hit_rate
    );
    info!(
        "  {} agents, {} active chunks, {} address mappings",
        stats.tracked_agents, stats.active_chunks, stats.address_mappings
    );
    if stats.store.persist_failures > 0 {
        warn!("  {} chunk writes failed", stats.store.persist_failures);
    }
}

/// Runs the application.
pub fn run(config: EngineConfig) -> Result<()> {
    info!("Configuration loaded:");
    info!("  World: {} (seed {})", config.world.world_name, config.world.seed);
    info!(
        "  Chunks: {} tiles, {} resident max",
        config.world.chunk_size, config.world.max_loaded_chunks
    );
    info!("  Agents: {}, ticks: {}", config.agents, config.ticks);

    Simulation::new(config)?.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> EngineConfig {
        let mut config = EngineConfig {
            agents: 3,
            ticks: 60,
            wander_radius: 8,
            stats_interval: 20,
            export_path: Some(dir.path().join("view.json")),
            ..EngineConfig::default()
        };
        config.world.chunk_size = 16;
        config.world.safe_origin_radius = Some(3);
        config.world.spawn_search_radius = 3;
        config.world.save_dir = dir.path().join("world");
        config
    }

    #[test]
    fn test_agents_are_spawned_and_tracked() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let sim = Simulation::new(config(&dir)).expect("simulation");
        assert_eq!(sim.positions().len(), 3);
        assert_eq!(sim.world().get_stats().tracked_agents, 3);
    }

    #[test]
    fn test_walkers_move_on_passable_tiles() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut sim = Simulation::new(config(&dir)).expect("simulation");
        let start = sim.positions();
        for _ in 0..30 {
            sim.step();
            for position in sim.positions() {
                assert!(!sim.world().tile_at(position).collision);
            }
        }
        assert_ne!(sim.positions(), start);
        assert_eq!(sim.world().ticks(), 30);
    }

    #[test]
    fn test_run_exports_and_saves() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let stats = Simulation::new(config(&dir))
            .expect("simulation")
            .run()
            .expect("run");
        assert_eq!(stats.ticks, 60);
        assert!(dir.path().join("view.json").exists());
        assert!(dir.path().join("world").read_dir().expect("save dir").next().is_some());
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = config(&dir);
        config.world.chunk_size = 0;
        assert!(Simulation::new(config).is_err());
    }
}
