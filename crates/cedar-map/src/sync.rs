//! The boundary to the sync peer.
//!
//! [`SyncClient`] is what the coordinator drives: connection control, cache
//! sizing, block loads and synchronous lookups into whatever the peer
//! already holds. Results and other users' changes come back through the
//! event queue (see [`events`](crate::events)), never through return values.
//!
//! [`MapEditor`] is the write side used by editing tools. Edits are not
//! applied locally; the peer broadcasts them back as [`SyncEvent`]s.
//!
//! [`SyncEvent`]: crate::events::SyncEvent

use thiserror::Error;

use crate::coords::BlockAddress;
use crate::tile::{LandTile, StaticTile};

/// Login details passed to [`SyncClient::connect`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Returned by a successful [`SyncClient::connect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectInfo {
    /// World width in blocks.
    pub width: u16,
    /// World height in blocks.
    pub height: u16,
}

/// Errors reported by a sync peer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("authentication failed for user '{0}'")]
    AuthenticationFailed(String),

    #[error("could not reach {host}:{port}: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("sync worker has shut down")]
    WorkerGone,
}

/// The sync peer as seen by the coordinator.
///
/// Methods that start work (`load_blocks`, `disconnect`) return at once; the
/// outcome arrives later as events. Lookups answer from data the peer
/// already holds and never block on the network.
pub trait SyncClient {
    /// Opens a session.
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> Result<ConnectInfo, SyncError>;

    /// Closes the session. A `Disconnected` event follows.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Advises the peer how many blocks it should be able to hold. Called
    /// before any [`load_blocks`](Self::load_blocks) of the same pass.
    fn resize_cache(&mut self, capacity: usize);

    /// Requests blocks. Each arrives as a `BlockLoaded` event.
    fn load_blocks(&mut self, addresses: &[BlockAddress]);

    /// The land tile at `(x, y)`, if the peer holds its block.
    fn land_tile(&self, x: u16, y: u16) -> Option<LandTile>;

    /// The statics at `(x, y)`. Empty if none, or if the peer does not hold
    /// the block.
    fn static_tiles(&self, x: u16, y: u16) -> Vec<StaticTile>;
}

/// An edit request submitted to the sync peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edit {
    ReplaceLand { x: u16, y: u16, id: u16 },
    ElevateLand { x: u16, y: u16, z: i8 },
    AddStatic(StaticTile),
    RemoveStatic(StaticTile),
    MoveStatic { tile: StaticTile, x: u16, y: u16 },
    ElevateStatic { tile: StaticTile, z: i8 },
    HueStatic { tile: StaticTile, hue: u16 },
}

/// Submits edits to the sync peer.
pub trait MapEditor {
    /// Queues one edit. Success means the peer accepted the request, not
    /// that it has been applied.
    fn submit(&self, edit: Edit) -> Result<(), SyncError>;

    fn replace_land(&self, x: u16, y: u16, id: u16) -> Result<(), SyncError> {
        self.submit(Edit::ReplaceLand { x, y, id })
    }

    fn elevate_land(&self, x: u16, y: u16, z: i8) -> Result<(), SyncError> {
        self.submit(Edit::ElevateLand { x, y, z })
    }

    fn add_static(&self, tile: StaticTile) -> Result<(), SyncError> {
        self.submit(Edit::AddStatic(tile))
    }

    fn remove_static(&self, tile: StaticTile) -> Result<(), SyncError> {
        self.submit(Edit::RemoveStatic(tile))
    }

    fn move_static(&self, tile: StaticTile, x: u16, y: u16) -> Result<(), SyncError> {
        self.submit(Edit::MoveStatic { tile, x, y })
    }

    fn elevate_static(&self, tile: StaticTile, z: i8) -> Result<(), SyncError> {
        self.submit(Edit::ElevateStatic { tile, z })
    }

    fn hue_static(&self, tile: StaticTile, hue: u16) -> Result<(), SyncError> {
        self.submit(Edit::HueStatic { tile, hue })
    }
}
