//! The authoritative world held by the loopback peer.
//!
//! A [`MemoryWorld`] is a row-major grid of [`BlockData`], each block holding
//! its 64 land tiles in row-major order plus any number of statics. Worlds
//! persist to disk as RON.

use std::path::Path;

use cedar_map::{
    BLOCK_AREA, BLOCK_SIZE, BlockAddress, BlockData, Edit, LandTile, StaticTile, SyncEvent,
    TileCoord, WorldBounds,
};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Land graphic used by [`MemoryWorld::flat`].
pub const DEFAULT_LAND_ID: u16 = 0x0003;

/// Land graphics scattered by [`MemoryWorld::generate`].
const LAND_IDS: [u16; 4] = [0x0003, 0x0004, 0x0005, 0x0006];

/// Static graphics scattered by [`MemoryWorld::generate`].
const STATIC_IDS: [u16; 6] = [0x0CE3, 0x0D32, 0x1CD9, 0x1CDA, 0x1CDB, 0x1CDC];

/// Errors loading, saving or validating a world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Failed to read the world file.
    #[error("failed to read world: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to write the world file.
    #[error("failed to write world: {0}")]
    WriteError(#[source] std::io::Error),

    /// Failed to parse RON content.
    #[error("failed to parse world: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Failed to serialize the world to RON.
    #[error("failed to serialize world: {0}")]
    SerializeError(#[source] ron::Error),

    /// The file parsed but does not describe a consistent world.
    #[error("invalid world: {0}")]
    Invalid(String),
}

/// A whole world held in memory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWorld {
    width: u16,
    height: u16,
    blocks: Vec<BlockData>,
}

impl MemoryWorld {
    /// A world of `width` × `height` blocks of flat land at z = 0 with no
    /// statics.
    pub fn flat(width: u16, height: u16) -> Self {
        Self::build(width, height, |x, y| LandTile::new(x, y, 0, DEFAULT_LAND_ID))
    }

    /// A deterministic pseudo-random world.
    ///
    /// Land gets gently varying heights; roughly one tile in twelve carries
    /// a static, and a few of those are stacked duplicates.
    pub fn generate(width: u16, height: u16, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut world = Self::flat(width, height);

        for block in &mut world.blocks {
            for land in &mut block.land {
                land.id = LAND_IDS[rng.random_range(0..LAND_IDS.len())];
                land.z = rng.random_range(-2..=2);
            }
            for land in &block.land {
                if rng.random_range(0..12) != 0 {
                    continue;
                }
                let id = STATIC_IDS[rng.random_range(0..STATIC_IDS.len())];
                let tile = StaticTile::new(id, land.x, land.y, land.z, 0);
                block.statics.push(tile);
                if rng.random_bool(0.1) {
                    block.statics.push(tile.elevated_to(land.z.saturating_add(1)));
                }
            }
        }
        world
    }

    fn build(width: u16, height: u16, land: impl Fn(u16, u16) -> LandTile) -> Self {
        let mut blocks = Vec::with_capacity(usize::from(width) * usize::from(height));
        for by in 0..height {
            for bx in 0..width {
                let addr = BlockAddress::new(bx, by);
                let mut block = BlockData::new(addr);
                block.land = addr.tiles().iter().map(|c| land(c.x, c.y)).collect();
                blocks.push(block);
            }
        }
        Self {
            width,
            height,
            blocks,
        }
    }

    /// Width in blocks.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Height in blocks.
    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn bounds(&self) -> WorldBounds {
        WorldBounds::new(self.width, self.height)
    }

    fn index(&self, addr: BlockAddress) -> Option<usize> {
        self.bounds()
            .contains_block(addr)
            .then(|| usize::from(addr.y) * usize::from(self.width) + usize::from(addr.x))
    }

    /// The block at `addr`, if inside the world.
    pub fn block(&self, addr: BlockAddress) -> Option<&BlockData> {
        self.index(addr).map(|i| &self.blocks[i])
    }

    fn block_mut(&mut self, addr: BlockAddress) -> Option<&mut BlockData> {
        self.index(addr).map(|i| &mut self.blocks[i])
    }

    fn land_index(coord: TileCoord) -> usize {
        usize::from(coord.y % BLOCK_SIZE) * usize::from(BLOCK_SIZE) + usize::from(coord.x % BLOCK_SIZE)
    }

    /// The land tile at `(x, y)`.
    pub fn land_tile(&self, x: u16, y: u16) -> Option<LandTile> {
        let coord = TileCoord::new(x, y);
        self.block(coord.block())?
            .land
            .get(Self::land_index(coord))
            .copied()
    }

    fn land_mut(&mut self, x: u16, y: u16) -> Option<&mut LandTile> {
        let coord = TileCoord::new(x, y);
        self.block_mut(coord.block())?
            .land
            .get_mut(Self::land_index(coord))
    }

    /// The statics at `(x, y)` in storage order.
    pub fn static_tiles(&self, x: u16, y: u16) -> Vec<StaticTile> {
        let coord = TileCoord::new(x, y);
        self.block(coord.block())
            .map(|b| b.statics.iter().filter(|s| s.coord() == coord).copied().collect())
            .unwrap_or_default()
    }

    fn add_static(&mut self, tile: StaticTile) -> bool {
        match self.block_mut(tile.coord().block()) {
            Some(block) => {
                block.statics.push(tile);
                true
            }
            None => false,
        }
    }

    fn remove_static(&mut self, tile: &StaticTile) -> bool {
        let Some(block) = self.block_mut(tile.coord().block()) else {
            return false;
        };
        match block.statics.iter().position(|s| s == tile) {
            Some(index) => {
                block.statics.remove(index);
                true
            }
            None => false,
        }
    }

    fn static_mut(&mut self, tile: &StaticTile) -> Option<&mut StaticTile> {
        self.block_mut(tile.coord().block())?
            .statics
            .iter_mut()
            .find(|s| *s == tile)
    }

    /// Applies an edit. Returns the event announcing it, or `None` if the
    /// edit referred to something that does not exist.
    pub fn apply(&mut self, edit: Edit) -> Option<SyncEvent> {
        match edit {
            Edit::ReplaceLand { x, y, id } => {
                let land = self.land_mut(x, y)?;
                land.id = id;
                Some(SyncEvent::LandReplaced(*land))
            }
            Edit::ElevateLand { x, y, z } => {
                let land = self.land_mut(x, y)?;
                land.z = z;
                Some(SyncEvent::LandElevated(*land))
            }
            Edit::AddStatic(tile) => self.add_static(tile).then_some(SyncEvent::StaticAdded(tile)),
            Edit::RemoveStatic(tile) => {
                self.remove_static(&tile).then_some(SyncEvent::StaticRemoved(tile))
            }
            Edit::MoveStatic { tile, x, y } => {
                if !self.bounds().contains_block(TileCoord::new(x, y).block())
                    || !self.remove_static(&tile)
                {
                    return None;
                }
                self.add_static(tile.moved_to(x, y));
                Some(SyncEvent::StaticMoved {
                    tile,
                    new_x: x,
                    new_y: y,
                })
            }
            Edit::ElevateStatic { tile, z } => {
                let cached = self.static_mut(&tile)?;
                cached.z = z;
                Some(SyncEvent::StaticElevated { tile, new_z: z })
            }
            Edit::HueStatic { tile, hue } => {
                let cached = self.static_mut(&tile)?;
                cached.hue = hue;
                Some(SyncEvent::StaticHued { tile, new_hue: hue })
            }
        }
    }

    /// Checks that the block grid and every block's land layout are
    /// consistent.
    pub fn validate(&self) -> Result<(), WorldError> {
        let expected = usize::from(self.width) * usize::from(self.height);
        if self.blocks.len() != expected {
            return Err(WorldError::Invalid(format!(
                "expected {} blocks for {}x{}, found {}",
                expected,
                self.width,
                self.height,
                self.blocks.len()
            )));
        }
        for (i, block) in self.blocks.iter().enumerate() {
            let addr = block.address;
            if self.index(addr) != Some(i) {
                return Err(WorldError::Invalid(format!(
                    "block ({}, {}) stored at index {}",
                    addr.x, addr.y, i
                )));
            }
            if block.land.len() != BLOCK_AREA as usize {
                return Err(WorldError::Invalid(format!(
                    "block ({}, {}) has {} land tiles",
                    addr.x,
                    addr.y,
                    block.land.len()
                )));
            }
            let misplaced = addr
                .tiles()
                .iter()
                .zip(&block.land)
                .any(|(coord, land)| land.coord() != coord);
            if misplaced {
                return Err(WorldError::Invalid(format!(
                    "block ({}, {}) land is not in row-major order",
                    addr.x, addr.y
                )));
            }
            if let Some(stray) = block.statics.iter().find(|s| !addr.contains(s.coord())) {
                return Err(WorldError::Invalid(format!(
                    "static {:?} stored in block ({}, {})",
                    stray, addr.x, addr.y
                )));
            }
        }
        Ok(())
    }

    /// Loads and validates a world file.
    pub fn load(path: &Path) -> Result<Self, WorldError> {
        let contents = std::fs::read_to_string(path).map_err(WorldError::ReadError)?;
        let world: MemoryWorld = ron::from_str(&contents).map_err(WorldError::ParseError)?;
        world.validate()?;
        tracing::info!(
            "Loaded {}x{} block world from {}",
            world.width,
            world.height,
            path.display()
        );
        Ok(world)
    }

    /// Writes the world to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), WorldError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(WorldError::WriteError)?;
        }
        let serialized = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .map_err(WorldError::SerializeError)?;
        std::fs::write(path, serialized).map_err(WorldError::WriteError)?;
        Ok(())
    }
}
