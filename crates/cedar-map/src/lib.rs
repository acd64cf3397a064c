//! Viewport-driven block cache and incremental tile synchronisation for the
//! cedar map editor.
//!
//! The [`CacheCoordinator`] keeps a [`TileStore`] holding exactly the tiles
//! around the [`Camera`], requesting blocks from a [`SyncClient`] as the view
//! moves and applying the peer's [`SyncEvent`]s in order.

pub mod coordinator;
pub mod coords;
pub mod events;
pub mod ghost;
pub mod store;
pub mod sync;
pub mod tile;
pub mod view;

pub use coordinator::{CacheCoordinator, ConnectionState, ReconcileState, TickReport};
pub use coords::{BLOCK_AREA, BLOCK_SIZE, BlockAddress, BlockRect, TileCoord, TileRect, WorldBounds};
pub use events::{EventReceiver, EventSender, SyncEvent, event_channel};
pub use ghost::GhostLayer;
pub use store::{Removed, TileStore};
pub use sync::{ConnectInfo, Credentials, Edit, MapEditor, SyncClient, SyncError};
pub use tile::{BlockData, CachedLand, Corner, DrawOrder, FlatDrawOrder, LandTile, StaticTile, sort_statics};
pub use view::{Camera, MIN_ZOOM, TILE_SIZE, ViewDiff, ViewParams, ViewTracker};
