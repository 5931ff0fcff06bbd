//! Bounded A* pathfinding over tile collision.
//!
//! 4-connected moves of cost 1 with a Manhattan heuristic. The search is
//! bounded by a Manhattan radius around the start and a cap on expanded
//! nodes, so an unreachable target in an infinite world terminates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};
use atlas_common::WorldCoord;
use tracing::debug;

use crate::store::ChunkStore;

/// Anything that can say whether a tile blocks movement.
pub trait CollisionMap {
    /// Whether `coord` cannot be entered.
    fn is_blocked(&self, coord: WorldCoord) -> bool;
}

impl CollisionMap for ChunkStore {
    fn is_blocked(&self, coord: WorldCoord) -> bool {
        ChunkStore::is_blocked(self, coord)
    }
}

/// Limits on a single search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathBounds {
    /// Maximum Manhattan distance from the start any visited tile may have
    pub max_distance: u64,
    /// Maximum number of nodes expanded before giving up
    pub max_expanded: usize,
}

impl Default for PathBounds {
    fn default() -> Self {
        Self {
            max_distance: 100,
            max_expanded: 10_000,
        }
    }
}

/// Node in the A* open set
#[derive(Debug, Clone, Copy)]
struct PathNode {
    coord: WorldCoord,
    f_cost: u64,
    h_cost: u64,
    seq: u64,
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        (other.f_cost, other.h_cost, other.seq).cmp(&(self.f_cost, self.h_cost, self.seq))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* search with fixed bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pathfinder {
    bounds: PathBounds,
}

impl Pathfinder {
    /// Creates a pathfinder with the given bounds.
    #[must_use]
    pub const fn new(bounds: PathBounds) -> Self {
        Self { bounds }
    }

    /// Search bounds.
    #[must_use]
    pub const fn bounds(&self) -> PathBounds {
        self.bounds
    }

    /// Finds a path from `start` to `goal`, both included.
    ///
    /// Returns an empty path when `start == goal`, the goal is blocked or
    /// unreachable, or the search leaves its bounds.
    pub fn find_path<M: CollisionMap + ?Sized>(
        &self,
        map: &M,
        start: WorldCoord,
        goal: WorldCoord,
    ) -> Vec<WorldCoord> {
        self.find_path_within(map, start, goal, self.bounds.max_distance)
    }

    /// [`Self::find_path`] with an explicit radius bound.
    pub fn find_path_within<M: CollisionMap + ?Sized>(
        &self,
        map: &M,
        start: WorldCoord,
        goal: WorldCoord,
        max_distance: u64,
    ) -> Vec<WorldCoord> {
        if start == goal || start.manhattan(goal) > max_distance || map.is_blocked(goal) {
            return Vec::new();
        }

        let mut open_set = BinaryHeap::new();
        let mut came_from: AHashMap<WorldCoord, WorldCoord> = AHashMap::new();
        let mut g_scores: AHashMap<WorldCoord, u64> = AHashMap::new();
        let mut closed: AHashSet<WorldCoord> = AHashSet::new();
        let mut seq = 0u64;
        let mut expanded = 0usize;

        let h = start.manhattan(goal);
        g_scores.insert(start, 0);
        open_set.push(PathNode {
            coord: start,
            f_cost: h,
            h_cost: h,
            seq,
        });

        while let Some(current) = open_set.pop() {
            if current.coord == goal {
                return reconstruct_path(&came_from, goal);
            }
            if !closed.insert(current.coord) {
                continue;
            }
            expanded += 1;
            if expanded > self.bounds.max_expanded {
                debug!(
                    "Path {start} -> {goal} abandoned after {} expansions",
                    self.bounds.max_expanded
                );
                return Vec::new();
            }

            let current_g = g_scores.get(&current.coord).copied().unwrap_or(u64::MAX);
            for neighbor in current.coord.neighbors4() {
                if closed.contains(&neighbor)
                    || neighbor.manhattan(start) > max_distance
                    || map.is_blocked(neighbor)
                {
                    continue;
                }
                let tentative_g = current_g + 1;
                let neighbor_g = g_scores.get(&neighbor).copied().unwrap_or(u64::MAX);
                if tentative_g < neighbor_g {
                    came_from.insert(neighbor, current.coord);
                    g_scores.insert(neighbor, tentative_g);
                    let h_cost = neighbor.manhattan(goal);
                    seq += 1;
                    open_set.push(PathNode {
                        coord: neighbor,
                        f_cost: tentative_g + h_cost,
                        h_cost,
                        seq,
                    });
                }
            }
        }

        Vec::new()
    }

    /// Passable 4-neighbors of `coord`, in north, east, south, west order.
    pub fn get_around<M: CollisionMap + ?Sized>(map: &M, coord: WorldCoord) -> Vec<WorldCoord> {
        coord
            .neighbors4()
            .into_iter()
            .filter(|&n| !map.is_blocked(n))
            .collect()
    }
}

/// Reconstruct path from came_from map
fn reconstruct_path(
    came_from: &AHashMap<WorldCoord, WorldCoord>,
    mut current: WorldCoord,
) -> Vec<WorldCoord> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}
