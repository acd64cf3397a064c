//! In-memory store of the currently cached land and static tiles.
//!
//! [`TileStore`] provides O(1) per-coordinate lookup using
//! [`FxHashMap`](rustc_hash::FxHashMap)s keyed by [`TileCoord`]. It owns no
//! network state; the coordinator decides what goes in and what comes out.

use rustc_hash::FxHashMap;

use crate::coords::{BlockAddress, TileCoord, TileRect};
use crate::tile::{CachedLand, DrawOrder, LandTile, StaticTile, sort_statics};

/// Number of tiles removed by a bulk removal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Removed {
    /// Land tiles removed.
    pub land: usize,
    /// Static tiles removed.
    pub statics: usize,
}

impl Removed {
    /// Total tiles removed.
    pub fn total(&self) -> usize {
        self.land + self.statics
    }
}

/// Cached land and static tiles.
///
/// At most one land tile exists per coordinate, so land insertion is an
/// upsert. Statics at one coordinate are kept in draw order; iteration order
/// across coordinates is unspecified.
#[derive(Debug, Default)]
pub struct TileStore {
    land: FxHashMap<TileCoord, CachedLand>,
    statics: FxHashMap<TileCoord, Vec<StaticTile>>,
    static_count: usize,
}

impl TileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a land tile, replacing any tile already at its coordinate.
    ///
    /// Returns the replaced tile.
    pub fn insert_land(&mut self, land: CachedLand) -> Option<CachedLand> {
        self.land.insert(land.coord(), land)
    }

    /// Inserts a static tile at the end of its cell.
    ///
    /// Returns `false` without inserting if an identical tuple is already
    /// cached.
    pub fn insert_static(&mut self, tile: StaticTile) -> bool {
        let cell = self.statics.entry(tile.coord()).or_default();
        if cell.contains(&tile) {
            return false;
        }
        cell.push(tile);
        self.static_count += 1;
        true
    }

    /// Removes the land tile at `coord`. Removing nothing is not an error.
    pub fn remove_land_at(&mut self, coord: TileCoord) -> Option<CachedLand> {
        self.land.remove(&coord)
    }

    /// Removes the static tile equal to `tile`. Returns `false` if absent.
    pub fn remove_static(&mut self, tile: &StaticTile) -> bool {
        let coord = tile.coord();
        let Some(cell) = self.statics.get_mut(&coord) else {
            return false;
        };
        let Some(index) = cell.iter().position(|t| t == tile) else {
            return false;
        };
        cell.remove(index);
        self.static_count -= 1;
        if cell.is_empty() {
            self.statics.remove(&coord);
        }
        true
    }

    /// Removes every static tile matching `predicate`. Returns how many
    /// were removed.
    pub fn remove_static_matching(&mut self, mut predicate: impl FnMut(&StaticTile) -> bool) -> usize {
        let mut removed = 0;
        self.statics.retain(|_, cell| {
            let before = cell.len();
            cell.retain(|t| !predicate(t));
            removed += before - cell.len();
            !cell.is_empty()
        });
        self.static_count -= removed;
        removed
    }

    /// Removes every land and static tile whose coordinate lies outside
    /// `range`.
    pub fn evict_outside(&mut self, range: &TileRect) -> Removed {
        let land_before = self.land.len();
        self.land.retain(|coord, _| range.contains(*coord));

        let mut statics = 0;
        self.statics.retain(|coord, cell| {
            let keep = range.contains(*coord);
            if !keep {
                statics += cell.len();
            }
            keep
        });
        self.static_count -= statics;

        Removed {
            land: land_before - self.land.len(),
            statics,
        }
    }

    /// Removes every land and static tile inside `block`.
    pub fn remove_block(&mut self, block: BlockAddress) -> Removed {
        let land_before = self.land.len();
        self.land.retain(|coord, _| coord.block() != block);

        let mut statics = 0;
        self.statics.retain(|coord, cell| {
            let keep = coord.block() != block;
            if !keep {
                statics += cell.len();
            }
            keep
        });
        self.static_count -= statics;

        Removed {
            land: land_before - self.land.len(),
            statics,
        }
    }

    /// The land tile at `coord`.
    pub fn find_land_at(&self, coord: TileCoord) -> Option<&CachedLand> {
        self.land.get(&coord)
    }

    /// Mutable access to the land tile at `coord`.
    pub fn land_mut(&mut self, coord: TileCoord) -> Option<&mut CachedLand> {
        self.land.get_mut(&coord)
    }

    /// The statics at `coord` in draw order. Empty if none are cached.
    pub fn find_static_at(&self, coord: TileCoord) -> &[StaticTile] {
        self.statics.get(&coord).map_or(&[], Vec::as_slice)
    }

    /// Mutable access to the cached static equal to `tile`.
    pub fn static_mut(&mut self, tile: &StaticTile) -> Option<&mut StaticTile> {
        self.statics
            .get_mut(&tile.coord())?
            .iter_mut()
            .find(|t| *t == tile)
    }

    /// Re-sorts the statics at `coord` back-to-front.
    pub fn sort_cell(&mut self, coord: TileCoord, order: &dyn DrawOrder) {
        if let Some(cell) = self.statics.get_mut(&coord) {
            sort_statics(cell, order);
        }
    }

    /// Iterates every cached land tile.
    pub fn land_tiles(&self) -> impl Iterator<Item = &CachedLand> {
        self.land.values()
    }

    /// Iterates every cached static tile. Statics of one coordinate are
    /// yielded together in draw order.
    pub fn static_tiles(&self) -> impl Iterator<Item = &StaticTile> {
        self.statics.values().flatten()
    }

    /// Iterates the raw land tiles, without vertex heights.
    pub fn land_values(&self) -> impl Iterator<Item = LandTile> + '_ {
        self.land.values().map(|l| *l.tile())
    }

    /// Number of cached land tiles.
    pub fn land_count(&self) -> usize {
        self.land.len()
    }

    /// Number of cached static tiles.
    pub fn static_count(&self) -> usize {
        self.static_count
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.land.is_empty() && self.static_count == 0
    }

    /// Drops every cached tile.
    pub fn clear(&mut self) {
        self.land.clear();
        self.statics.clear();
        self.static_count = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
