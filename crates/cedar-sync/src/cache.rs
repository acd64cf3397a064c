//! Bounded least-recently-used cache of delivered blocks.
//!
//! The peer keeps a copy of every block it has sent so the synchronous
//! lookups ([`land_tile`](BlockCache::land_tile),
//! [`static_tiles`](BlockCache::static_tiles)) can answer without touching
//! the world. Blocks pushed out by capacity are returned to the caller so
//! they can be announced as unloaded.

use std::collections::VecDeque;

use cedar_map::{BlockAddress, BlockData, LandTile, StaticTile, TileCoord};
use rustc_hash::{FxHashMap, FxHashSet};

/// LRU block cache. Least recently used blocks sit at the front of `order`.
#[derive(Debug, Default)]
pub struct BlockCache {
    capacity: usize,
    blocks: FxHashMap<BlockAddress, BlockData>,
    order: VecDeque<BlockAddress>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, addr: BlockAddress) -> bool {
        self.blocks.contains_key(&addr)
    }

    pub fn get(&self, addr: BlockAddress) -> Option<&BlockData> {
        self.blocks.get(&addr)
    }

    fn touch(&mut self, addr: BlockAddress) {
        if let Some(pos) = self.order.iter().position(|a| *a == addr) {
            self.order.remove(pos);
        }
        self.order.push_back(addr);
    }

    /// Inserts or refreshes a block as most recently used, then evicts down
    /// to capacity. Blocks in `pinned` are never evicted, so a batch being
    /// delivered cannot push out its own members.
    ///
    /// Returns the evicted addresses.
    pub fn insert(&mut self, block: BlockData, pinned: &FxHashSet<BlockAddress>) -> Vec<BlockAddress> {
        let addr = block.address;
        self.blocks.insert(addr, block);
        self.touch(addr);
        self.evict_to(self.capacity, pinned)
    }

    /// Replaces the contents of a cached block without changing its
    /// recency. Does nothing if the block is not cached.
    pub fn refresh(&mut self, block: &BlockData) {
        if let Some(cached) = self.blocks.get_mut(&block.address) {
            cached.clone_from(block);
        }
    }

    /// Changes the capacity, evicting least recently used blocks if the
    /// cache is now over it. Returns the evicted addresses.
    pub fn resize(&mut self, capacity: usize) -> Vec<BlockAddress> {
        self.capacity = capacity;
        self.evict_to(capacity, &FxHashSet::default())
    }

    fn evict_to(&mut self, capacity: usize, pinned: &FxHashSet<BlockAddress>) -> Vec<BlockAddress> {
        let mut evicted = Vec::new();
        let mut index = 0;
        while self.blocks.len() > capacity && index < self.order.len() {
            let addr = self.order[index];
            if pinned.contains(&addr) {
                index += 1;
                continue;
            }
            self.order.remove(index);
            self.blocks.remove(&addr);
            evicted.push(addr);
        }
        if self.blocks.len() > capacity {
            tracing::debug!(
                "block cache over capacity ({} > {}) with pinned blocks",
                self.blocks.len(),
                capacity
            );
        }
        evicted
    }

    /// Drops every block.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.order.clear();
    }

    /// The land tile at `(x, y)`, if its block is cached.
    pub fn land_tile(&self, x: u16, y: u16) -> Option<LandTile> {
        let coord = TileCoord::new(x, y);
        self.blocks
            .get(&coord.block())?
            .land
            .iter()
            .find(|l| l.coord() == coord)
            .copied()
    }

    /// The statics at `(x, y)`, empty if the block is not cached.
    pub fn static_tiles(&self, x: u16, y: u16) -> Vec<StaticTile> {
        let coord = TileCoord::new(x, y);
        self.blocks
            .get(&coord.block())
            .map(|b| b.statics.iter().filter(|s| s.coord() == coord).copied().collect())
            .unwrap_or_default()
    }
}
