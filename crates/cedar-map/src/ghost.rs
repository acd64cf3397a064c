//! Ghost tiles: locally previewed, uncommitted edits owned by editing tools.
//!
//! Ghosts sit beside the cache rather than inside it. They are never
//! evicted, never touched by sync notifications and survive reconnects;
//! only the tool that set them replaces or clears them.

use crate::tile::{LandTile, StaticTile};

/// The preview layer written by interactive tools.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GhostLayer {
    land: Vec<LandTile>,
    statics: Vec<StaticTile>,
}

impl GhostLayer {
    /// Creates an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole layer.
    pub fn set(&mut self, land: Vec<LandTile>, statics: Vec<StaticTile>) {
        self.land = land;
        self.statics = statics;
    }

    /// Drops every ghost tile.
    pub fn clear(&mut self) {
        self.land.clear();
        self.statics.clear();
    }

    pub fn land(&self) -> &[LandTile] {
        &self.land
    }

    pub fn statics(&self) -> &[StaticTile] {
        &self.statics
    }

    pub fn is_empty(&self) -> bool {
        self.land.is_empty() && self.statics.is_empty()
    }
}
