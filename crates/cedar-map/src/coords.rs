//! Tile and block coordinates, world bounds, and rectangle arithmetic.
//!
//! The world is a grid of tiles addressed by `(x, y)`. Tiles are grouped
//! into fixed 8×8 blocks, identified by [`BlockAddress`]. Network loading
//! works in blocks; caching and rendering work in tiles.

use serde::{Deserialize, Serialize};

/// Edge length of a block, in tiles.
pub const BLOCK_SIZE: u16 = 8;

/// Number of tiles in one block.
pub const BLOCK_AREA: u32 = (BLOCK_SIZE as u32) * (BLOCK_SIZE as u32);

/// Position of a single tile in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Tile X coordinate.
    pub x: u16,
    /// Tile Y coordinate.
    pub y: u16,
}

impl TileCoord {
    /// Creates a new tile coordinate.
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// The block this tile belongs to.
    pub fn block(self) -> BlockAddress {
        BlockAddress::new(self.x / BLOCK_SIZE, self.y / BLOCK_SIZE)
    }

    /// Returns the coordinate offset by `(dx, dy)`, or `None` if the result
    /// would leave the `u16` coordinate space.
    pub fn offset(self, dx: i32, dy: i32) -> Option<Self> {
        let x = u16::try_from(i32::from(self.x) + dx).ok()?;
        let y = u16::try_from(i32::from(self.y) + dy).ok()?;
        Some(Self { x, y })
    }
}

/// Identifies an 8×8 block of tiles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockAddress {
    /// Block-grid X coordinate.
    pub x: u16,
    /// Block-grid Y coordinate.
    pub y: u16,
}

impl BlockAddress {
    /// Creates a new block address.
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Tile coordinate of the block's north-west corner.
    pub fn origin(self) -> TileCoord {
        TileCoord::new(self.x * BLOCK_SIZE, self.y * BLOCK_SIZE)
    }

    /// The tile rectangle covered by this block.
    pub fn tiles(self) -> TileRect {
        let origin = self.origin();
        TileRect::from_size(
            u32::from(origin.x),
            u32::from(origin.y),
            u32::from(BLOCK_SIZE),
            u32::from(BLOCK_SIZE),
        )
    }

    /// Returns `true` if `coord` lies inside this block.
    pub fn contains(self, coord: TileCoord) -> bool {
        coord.block() == self
    }
}

/// Size of the world in blocks, as reported by the server on connect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    /// Width in blocks.
    pub width: u16,
    /// Height in blocks.
    pub height: u16,
}

impl WorldBounds {
    /// Zero-sized world, used while disconnected.
    pub const EMPTY: Self = Self {
        width: 0,
        height: 0,
    };

    /// Creates world bounds from a size in blocks.
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Width of the world in tiles.
    pub fn tile_width(self) -> u32 {
        u32::from(self.width) * u32::from(BLOCK_SIZE)
    }

    /// Height of the world in tiles.
    pub fn tile_height(self) -> u32 {
        u32::from(self.height) * u32::from(BLOCK_SIZE)
    }

    /// Returns `true` if the world has no tiles.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Every tile of the world as a rectangle.
    pub fn tiles(self) -> TileRect {
        TileRect::from_size(0, 0, self.tile_width(), self.tile_height())
    }

    /// Every block of the world as a rectangle.
    pub fn blocks(self) -> BlockRect {
        BlockRect::new(0, 0, u32::from(self.width), u32::from(self.height))
    }

    /// Returns `true` if the block lies inside the world.
    pub fn contains_block(self, addr: BlockAddress) -> bool {
        addr.x < self.width && addr.y < self.height
    }
}

/// Axis-aligned rectangle of tiles, inclusive of `left`/`top` and exclusive
/// of `right`/`bottom`.
///
/// Empty rectangles are normalised to [`TileRect::EMPTY`] by every
/// constructor, so two empty rectangles always compare equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    /// First column inside the rectangle.
    pub left: u32,
    /// First row inside the rectangle.
    pub top: u32,
    /// First column past the rectangle.
    pub right: u32,
    /// First row past the rectangle.
    pub bottom: u32,
}

impl TileRect {
    /// The empty rectangle.
    pub const EMPTY: Self = Self {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    /// Creates a rectangle from its edges.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        if right <= left || bottom <= top {
            return Self::EMPTY;
        }
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Creates a rectangle from an origin and a size.
    pub fn from_size(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Creates a rectangle from two corners given in either order. Both
    /// corners are included.
    pub fn from_corners(x1: u16, y1: u16, x2: u16, y2: u16) -> Self {
        let (x_lo, x_hi) = (x1.min(x2), x1.max(x2));
        let (y_lo, y_hi) = (y1.min(y2), y1.max(y2));
        Self::new(
            u32::from(x_lo),
            u32::from(y_lo),
            u32::from(x_hi) + 1,
            u32::from(y_hi) + 1,
        )
    }

    /// Width in tiles.
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    /// Height in tiles.
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Number of tiles covered.
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Returns `true` if no tile is covered.
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Returns `true` if the coordinate lies inside the rectangle.
    pub fn contains(&self, coord: TileCoord) -> bool {
        self.contains_xy(u32::from(coord.x), u32::from(coord.y))
    }

    /// Returns `true` if `(x, y)` lies inside the rectangle.
    pub fn contains_xy(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Intersection of two rectangles.
    pub fn intersect(&self, other: &TileRect) -> TileRect {
        TileRect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }

    /// Clamps the rectangle to the tiles of `world`.
    pub fn clamp_to(&self, world: WorldBounds) -> TileRect {
        self.intersect(&world.tiles())
    }

    /// Every block overlapping this rectangle.
    pub fn blocks(&self) -> BlockRect {
        if self.is_empty() {
            return BlockRect::EMPTY;
        }
        let size = u32::from(BLOCK_SIZE);
        BlockRect::new(
            self.left / size,
            self.top / size,
            (self.right - 1) / size + 1,
            (self.bottom - 1) / size + 1,
        )
    }

    /// Iterates every coordinate inside the rectangle, row by row.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.top..self.bottom).flat_map(move |y| {
            (self.left..self.right).filter_map(move |x| {
                Some(TileCoord::new(u16::try_from(x).ok()?, u16::try_from(y).ok()?))
            })
        })
    }
}

/// Axis-aligned rectangle of blocks, exclusive of `right`/`bottom`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockRect {
    /// First block column inside the rectangle.
    pub left: u32,
    /// First block row inside the rectangle.
    pub top: u32,
    /// First block column past the rectangle.
    pub right: u32,
    /// First block row past the rectangle.
    pub bottom: u32,
}

impl BlockRect {
    /// The empty rectangle.
    pub const EMPTY: Self = Self {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    /// Creates a rectangle from its edges.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        if right <= left || bottom <= top {
            return Self::EMPTY;
        }
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Returns `true` if no block is covered.
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Number of blocks covered.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        ((self.right - self.left) as usize) * ((self.bottom - self.top) as usize)
    }

    /// Returns `true` if the block lies inside the rectangle.
    pub fn contains(&self, addr: BlockAddress) -> bool {
        let (x, y) = (u32::from(addr.x), u32::from(addr.y));
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Grows the rectangle by `margin` blocks on every side, clamped to the
    /// blocks of `world`.
    pub fn expand(&self, margin: u32, world: WorldBounds) -> BlockRect {
        if self.is_empty() {
            return BlockRect::EMPTY;
        }
        let bounds = world.blocks();
        BlockRect::new(
            self.left.saturating_sub(margin).max(bounds.left),
            self.top.saturating_sub(margin).max(bounds.top),
            self.right.saturating_add(margin).min(bounds.right),
            self.bottom.saturating_add(margin).min(bounds.bottom),
        )
    }

    /// Iterates every block address inside the rectangle, row by row.
    pub fn iter(&self) -> impl Iterator<Item = BlockAddress> + '_ {
        (self.top..self.bottom).flat_map(move |y| {
            (self.left..self.right).filter_map(move |x| {
                Some(BlockAddress::new(
                    u16::try_from(x).ok()?,
                    u16::try_from(y).ok()?,
                ))
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
