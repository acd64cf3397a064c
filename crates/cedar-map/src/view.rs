//! Camera state and view-range tracking.
//!
//! [`ViewTracker`] turns a [`Camera`] into the rectangle of tiles that must be
//! cached, and diffs successive rectangles into the blocks that must be
//! requested. Range computation is pure; the tracker only remembers the last
//! rectangle it reported so unchanged ticks exit early.

use crate::coords::{BlockAddress, BlockRect, TileCoord, TileRect, WorldBounds};

/// On-screen size of one tile, in pixels at zoom 1.
pub const TILE_SIZE: f32 = 31.11;

/// Smallest zoom factor the camera accepts.
pub const MIN_ZOOM: f32 = 0.1;

/// Camera position (pixels), zoom and screen size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Camera centre X, in pixels.
    pub x: f32,
    /// Camera centre Y, in pixels.
    pub y: f32,
    /// Zoom factor; larger values show fewer tiles.
    pub zoom: f32,
    /// Screen width in pixels.
    pub screen_width: u32,
    /// Screen height in pixels.
    pub screen_height: u32,
}

impl Camera {
    /// Creates a camera at the world origin with zoom 1.
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            screen_width,
            screen_height,
        }
    }

    /// Centres the camera on a tile.
    pub fn center_on_tile(&mut self, x: u16, y: u16) {
        self.x = f32::from(x) * TILE_SIZE;
        self.y = f32::from(y) * TILE_SIZE;
    }

    /// The tile under the camera centre.
    pub fn tile_position(&self) -> TileCoord {
        let to_tile = |v: f32| (v / TILE_SIZE).floor().clamp(0.0, f32::from(u16::MAX)) as u16;
        TileCoord::new(to_tile(self.x), to_tile(self.y))
    }

    /// Moves the camera by a pixel delta.
    pub fn move_by(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }

    /// Adds `delta` to the zoom factor, never going below [`MIN_ZOOM`].
    pub fn zoom_in(&mut self, delta: f32) {
        self.zoom = (self.zoom + delta).max(MIN_ZOOM);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Margins applied around the projected view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewParams {
    /// Extra tiles kept on every side of the projected rectangle, so tiles
    /// raised by elevation stay cached.
    pub tile_margin: u32,
    /// Extra blocks requested on every side of the view range, to mask
    /// load latency at the edges.
    pub block_margin: u32,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            tile_margin: 8,
            block_margin: 1,
        }
    }
}

/// Difference between two successive view ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewDiff {
    /// Range before the change.
    pub previous: TileRect,
    /// Range after the change.
    pub current: TileRect,
    /// Blocks the current range needs (with block margin).
    pub region: BlockRect,
    /// Blocks in `region` that the previous range's region did not cover.
    pub requested: Vec<BlockAddress>,
}

impl ViewDiff {
    /// Coordinates in the previous range but not the current one.
    pub fn evicted(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.previous.iter().filter(|c| !self.current.contains(*c))
    }

    /// Coordinates in the current range but not the previous one.
    pub fn entered(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.current.iter().filter(|c| !self.previous.contains(*c))
    }
}

/// Tracks the cached view range across ticks.
#[derive(Clone, Debug)]
pub struct ViewTracker {
    params: ViewParams,
    current: TileRect,
}

impl ViewTracker {
    /// Creates a tracker whose current range is empty.
    pub fn new(params: ViewParams) -> Self {
        Self {
            params,
            current: TileRect::EMPTY,
        }
    }

    pub fn params(&self) -> &ViewParams {
        &self.params
    }

    /// The range reported by the last changed [`update`](Self::update).
    pub fn current(&self) -> TileRect {
        self.current
    }

    /// Forgets the current range so the next update reports everything as
    /// newly visible.
    pub fn reset(&mut self) {
        self.current = TileRect::EMPTY;
    }

    /// Computes the tile rectangle to cache for `camera`.
    ///
    /// The screen projects to a diamond whose half-diagonal is
    /// `(width + height) / zoom / 3` pixels; the rectangle bounding it is
    /// grown by `tile_margin` and clamped to the world.
    pub fn compute_view_range(&self, camera: &Camera, world: WorldBounds) -> TileRect {
        if world.is_empty() || camera.zoom <= 0.0 {
            return TileRect::EMPTY;
        }
        let diagonal =
            (camera.screen_width as f32 + camera.screen_height as f32) / camera.zoom / 3.0;
        let margin = i64::from(self.params.tile_margin);

        let low = |center: f32| ((center - diagonal) / TILE_SIZE).ceil() as i64 - margin;
        let high = |center: f32| ((center + diagonal) / TILE_SIZE).ceil() as i64 + margin;
        let edge = |v: i64, limit: u32| v.clamp(0, i64::from(limit)) as u32;

        TileRect::new(
            edge(low(camera.x), world.tile_width()),
            edge(low(camera.y), world.tile_height()),
            edge(high(camera.x), world.tile_width()),
            edge(high(camera.y), world.tile_height()),
        )
    }

    /// Blocks that must be resident for `range`, including the block margin.
    pub fn request_region(&self, range: &TileRect, world: WorldBounds) -> BlockRect {
        range.blocks().expand(self.params.block_margin, world)
    }

    /// Diffs two ranges.
    pub fn diff(&self, previous: &TileRect, current: &TileRect, world: WorldBounds) -> ViewDiff {
        let old_region = self.request_region(previous, world);
        let region = self.request_region(current, world);
        let requested = region
            .iter()
            .filter(|addr| !old_region.contains(*addr))
            .collect();
        ViewDiff {
            previous: *previous,
            current: *current,
            region,
            requested,
        }
    }

    /// Recomputes the range for `camera`. Returns the diff against the last
    /// reported range, or `None` if nothing changed.
    pub fn update(&mut self, camera: &Camera, world: WorldBounds) -> Option<ViewDiff> {
        let next = self.compute_view_range(camera, world);
        if next == self.current {
            return None;
        }
        let diff = self.diff(&self.current, &next, world);
        self.current = next;
        Some(diff)
    }
}

impl Default for ViewTracker {
    fn default() -> Self {
        Self::new(ViewParams::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
