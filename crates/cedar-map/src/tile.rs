//! Land and static tile values, per-vertex land heights, and block payloads.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::coords::{BlockAddress, TileCoord};

/// A land tile. Exactly one exists per coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LandTile {
    /// Tile X coordinate.
    pub x: u16,
    /// Tile Y coordinate.
    pub y: u16,
    /// Elevation of the tile's own (top) vertex.
    pub z: i8,
    /// Land graphic id.
    pub id: u16,
}

impl LandTile {
    /// Creates a land tile.
    pub const fn new(x: u16, y: u16, z: i8, id: u16) -> Self {
        Self { x, y, z, id }
    }

    /// The tile's coordinate.
    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.x, self.y)
    }
}

/// A static tile. Several may share a coordinate; identity is equality over
/// the whole tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticTile {
    /// Static graphic id.
    pub id: u16,
    /// Tile X coordinate.
    pub x: u16,
    /// Tile Y coordinate.
    pub y: u16,
    /// Elevation.
    pub z: i8,
    /// Hue applied when drawing.
    pub hue: u16,
}

impl StaticTile {
    /// Creates a static tile.
    pub const fn new(id: u16, x: u16, y: u16, z: i8, hue: u16) -> Self {
        Self { id, x, y, z, hue }
    }

    /// The tile's coordinate.
    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.x, self.y)
    }

    /// Same graphic, elevation and hue at another coordinate.
    pub fn moved_to(&self, x: u16, y: u16) -> Self {
        Self { x, y, ..*self }
    }

    /// Same graphic, coordinate and hue at another elevation.
    pub fn elevated_to(&self, z: i8) -> Self {
        Self { z, ..*self }
    }
}

/// The four vertices of a land tile.
///
/// A land tile's top vertex sits at its own coordinate; the other three are
/// shared with the neighbouring tiles to the east, south and south-east.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Corner {
    /// Vertex at `(x, y)`.
    Top = 0,
    /// Vertex at `(x + 1, y)`.
    Right = 1,
    /// Vertex at `(x, y + 1)`.
    Left = 2,
    /// Vertex at `(x + 1, y + 1)`.
    Bottom = 3,
}

impl Corner {
    /// All corners in index order.
    pub const ALL: [Corner; 4] = [Corner::Top, Corner::Right, Corner::Left, Corner::Bottom];

    /// Offset from a tile to the coordinate whose elevation this corner
    /// takes.
    pub fn source_offset(self) -> (i32, i32) {
        match self {
            Corner::Top => (0, 0),
            Corner::Right => (1, 0),
            Corner::Left => (0, 1),
            Corner::Bottom => (1, 1),
        }
    }

    /// Offset from an elevated coordinate to the tile whose vertex this
    /// corner is. The inverse of [`source_offset`](Self::source_offset).
    pub fn owner_offset(self) -> (i32, i32) {
        let (dx, dy) = self.source_offset();
        (-dx, -dy)
    }
}

/// A cached land tile together with its four vertex heights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedLand {
    tile: LandTile,
    corners: [i8; 4],
}

impl CachedLand {
    /// Creates a cached tile with explicit vertex heights, indexed by
    /// [`Corner`].
    pub fn new(tile: LandTile, corners: [i8; 4]) -> Self {
        let mut cached = Self { tile, corners };
        cached.corners[Corner::Top as usize] = tile.z;
        cached
    }

    /// Creates a cached tile whose four vertices share its own elevation.
    pub fn flat(tile: LandTile) -> Self {
        Self {
            tile,
            corners: [tile.z; 4],
        }
    }

    /// The underlying land tile.
    pub fn tile(&self) -> &LandTile {
        &self.tile
    }

    /// The tile's coordinate.
    pub fn coord(&self) -> TileCoord {
        self.tile.coord()
    }

    /// Height of one vertex.
    pub fn corner(&self, corner: Corner) -> i8 {
        self.corners[corner as usize]
    }

    /// All vertex heights, indexed by [`Corner`].
    pub fn corners(&self) -> [i8; 4] {
        self.corners
    }

    /// Sets one vertex height. Setting the top vertex also sets the tile's
    /// own elevation.
    pub fn set_corner(&mut self, corner: Corner, z: i8) {
        self.corners[corner as usize] = z;
        if corner == Corner::Top {
            self.tile.z = z;
        }
    }

    /// Replaces the graphic id.
    pub fn set_id(&mut self, id: u16) {
        self.tile.id = id;
    }

    /// `true` when all four vertices share one height.
    pub fn is_flat(&self) -> bool {
        self.corners.iter().all(|&z| z == self.corners[0])
    }
}

/// The tiles of one block as delivered by a block load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockData {
    /// Which block this is.
    pub address: BlockAddress,
    /// Land tiles, normally one per coordinate of the block.
    pub land: Vec<LandTile>,
    /// Static tiles in any order.
    pub statics: Vec<StaticTile>,
}

impl BlockData {
    /// Creates an empty block payload.
    pub fn new(address: BlockAddress) -> Self {
        Self {
            address,
            land: Vec::new(),
            statics: Vec::new(),
        }
    }

    /// Content digest used to detect conflicting reloads of one block.
    pub fn digest(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Supplies the per-graphic draw priority used to order statics
/// back-to-front within a cell.
///
/// Tile-data files are parsed elsewhere; this trait is the seam.
pub trait DrawOrder: Send {
    /// Bonus added to a static's elevation when sorting.
    fn priority_bonus(&self, _id: u16) -> i16 {
        0
    }
}

/// Orders statics by elevation alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatDrawOrder;

impl DrawOrder for FlatDrawOrder {}

/// Sorts statics back-to-front: by elevation plus draw-priority bonus,
/// keeping insertion order among equals.
pub fn sort_statics(tiles: &mut [StaticTile], order: &dyn DrawOrder) {
    tiles.sort_by_key(|t| i16::from(t.z) + order.priority_bonus(t.id));
}
