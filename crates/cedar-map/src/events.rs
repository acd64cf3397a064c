//! Notifications delivered by the sync client, and the queue that carries
//! them to the coordinator.
//!
//! The sync client may run on its own thread; events are posted through a
//! bounded [`crossbeam_channel`] and applied on the coordinator's thread in
//! arrival order during [`tick`](crate::CacheCoordinator::tick).

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::time::Duration;

use crate::tile::{BlockData, LandTile, StaticTile};

/// A change reported by the sync client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// A session was established. The world is `width` × `height` blocks.
    Connected {
        /// World width in blocks.
        width: u16,
        /// World height in blocks.
        height: u16,
    },
    /// The session ended.
    Disconnected,
    /// The server asked the client to centre its view on a tile.
    Moved {
        /// Target tile X.
        x: u16,
        /// Target tile Y.
        y: u16,
    },
    /// A block's full contents arrived.
    BlockLoaded(BlockData),
    /// A block was dropped from the client's block cache.
    BlockUnloaded {
        /// Block-grid X.
        x: u16,
        /// Block-grid Y.
        y: u16,
    },
    /// A land tile's graphic changed. The payload carries the new id.
    LandReplaced(LandTile),
    /// A land tile's elevation changed. The payload carries the new z.
    LandElevated(LandTile),
    /// A static tile was added.
    StaticAdded(StaticTile),
    /// A static tile was removed.
    StaticRemoved(StaticTile),
    /// A static tile moved from `tile`'s coordinate to `(new_x, new_y)`.
    StaticMoved {
        /// The tile before the move.
        tile: StaticTile,
        /// Destination X.
        new_x: u16,
        /// Destination Y.
        new_y: u16,
    },
    /// A static tile's elevation changed from `tile.z` to `new_z`.
    StaticElevated {
        /// The tile before the change.
        tile: StaticTile,
        /// New elevation.
        new_z: i8,
    },
    /// A static tile's hue changed from `tile.hue` to `new_hue`.
    StaticHued {
        /// The tile before the change.
        tile: StaticTile,
        /// New hue.
        new_hue: u16,
    },
}

impl SyncEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Connected { .. } => "connected",
            SyncEvent::Disconnected => "disconnected",
            SyncEvent::Moved { .. } => "moved",
            SyncEvent::BlockLoaded(_) => "block_loaded",
            SyncEvent::BlockUnloaded { .. } => "block_unloaded",
            SyncEvent::LandReplaced(_) => "land_replaced",
            SyncEvent::LandElevated(_) => "land_elevated",
            SyncEvent::StaticAdded(_) => "static_added",
            SyncEvent::StaticRemoved(_) => "static_removed",
            SyncEvent::StaticMoved { .. } => "static_moved",
            SyncEvent::StaticElevated { .. } => "static_elevated",
            SyncEvent::StaticHued { .. } => "static_hued",
        }
    }
}

/// Creates a bounded event queue holding at most `capacity` events.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half of the event queue. Cloneable and `Send`.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: Sender<SyncEvent>,
}

impl EventSender {
    /// Posts an event, blocking while the queue is full.
    ///
    /// Returns `false` if the receiver has been dropped.
    pub fn send(&self, event: SyncEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Consumer half of the event queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<SyncEvent>,
}

impl EventReceiver {
    /// Takes every event currently queued, without blocking.
    ///
    /// Events posted while draining are left for the next call, so one
    /// drain always terminates.
    pub fn drain(&self) -> Vec<SyncEvent> {
        let pending = self.rx.len();
        let mut events = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }

    /// Waits up to `timeout` for one event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SyncEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
