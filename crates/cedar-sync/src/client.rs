//! In-process sync peer running on its own worker thread.
//!
//! [`LocalSyncClient`] implements [`SyncClient`] over a [`MemoryWorld`].
//! Calls on the client are turned into [`Request`]s on an ordered channel;
//! the worker answers them in order, posting [`SyncEvent`]s into the
//! coordinator's bounded queue. A full queue blocks the worker, never the
//! caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cedar_map::{
    BlockAddress, ConnectInfo, Credentials, Edit, EventSender, LandTile, MapEditor, StaticTile,
    SyncClient, SyncError, SyncEvent, TileCoord,
};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use rustc_hash::FxHashSet;

use crate::cache::BlockCache;
use crate::world::MemoryWorld;

/// Settings for a [`LocalSyncClient`].
#[derive(Clone, Debug, Default)]
pub struct LinkConfig {
    /// Accepted logins. Empty accepts anyone.
    pub accounts: Vec<Credentials>,
    /// Delay applied before answering each load request.
    pub load_latency: Duration,
}

impl LinkConfig {
    fn accepts(&self, credentials: &Credentials) -> bool {
        self.accounts.is_empty() || self.accounts.contains(credentials)
    }
}

/// Work items for the sync worker, processed strictly in order.
enum Request {
    Connect {
        host: String,
        port: u16,
        credentials: Credentials,
        reply: Sender<Result<ConnectInfo, SyncError>>,
    },
    Disconnect,
    Resize(usize),
    Load(Vec<BlockAddress>),
    Edit(Edit),
    Shutdown,
}

/// State shared between the client handle and its worker.
#[derive(Default)]
struct Shared {
    cache: Mutex<BlockCache>,
    connected: AtomicBool,
}

/// A [`SyncClient`] backed by an in-memory world on a worker thread.
pub struct LocalSyncClient {
    requests: Sender<Request>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<MemoryWorld>>,
}

impl LocalSyncClient {
    /// Starts the worker thread. Events are posted to `events`.
    pub fn spawn(world: MemoryWorld, config: LinkConfig, events: EventSender) -> std::io::Result<Self> {
        let (requests, request_rx) = unbounded();
        let shared = Arc::new(Shared::default());

        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("sync-link".into())
                .spawn(move || {
                    let mut link = Link {
                        world,
                        config,
                        events,
                        shared,
                    };
                    link.run(&request_rx);
                    link.world
                })?
        };

        Ok(Self {
            requests,
            shared,
            worker: Some(worker),
        })
    }

    /// An editor that submits edits as another user of the same world.
    pub fn remote_editor(&self) -> RemoteEditor {
        RemoteEditor {
            requests: self.requests.clone(),
        }
    }

    /// Number of blocks the peer currently holds.
    pub fn cached_blocks(&self) -> usize {
        self.shared.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Stops the worker once it has handled every earlier request and
    /// returns the world with all applied edits.
    ///
    /// The event receiver must keep being drained, or be dropped, while
    /// this waits: a worker blocked on a full queue never reaches the stop.
    pub fn shutdown(mut self) -> Option<MemoryWorld> {
        let _ = self.requests.send(Request::Shutdown);
        match self.worker.take()?.join() {
            Ok(world) => Some(world),
            Err(_) => {
                tracing::error!("sync worker panicked");
                None
            }
        }
    }

    fn send(&self, request: Request) -> Result<(), SyncError> {
        self.requests.send(request).map_err(|_| SyncError::WorkerGone)
    }
}

impl SyncClient for LocalSyncClient {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> Result<ConnectInfo, SyncError> {
        let (reply, response) = bounded(1);
        self.send(Request::Connect {
            host: host.to_string(),
            port,
            credentials: credentials.clone(),
            reply,
        })?;
        response.recv().map_err(|_| SyncError::WorkerGone)?
    }

    fn disconnect(&mut self) {
        if self.send(Request::Disconnect).is_err() {
            tracing::warn!("disconnect requested after sync worker shut down");
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn resize_cache(&mut self, capacity: usize) {
        if self.send(Request::Resize(capacity)).is_err() {
            tracing::warn!("cache resize dropped, sync worker shut down");
        }
    }

    fn load_blocks(&mut self, addresses: &[BlockAddress]) {
        if self.send(Request::Load(addresses.to_vec())).is_err() {
            tracing::warn!("load of {} blocks dropped, sync worker shut down", addresses.len());
        }
    }

    fn land_tile(&self, x: u16, y: u16) -> Option<LandTile> {
        self.shared.cache.lock().ok()?.land_tile(x, y)
    }

    fn static_tiles(&self, x: u16, y: u16) -> Vec<StaticTile> {
        self.shared
            .cache
            .lock()
            .map(|c| c.static_tiles(x, y))
            .unwrap_or_default()
    }
}

impl MapEditor for LocalSyncClient {
    fn submit(&self, edit: Edit) -> Result<(), SyncError> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.send(Request::Edit(edit))
    }
}

impl Drop for LocalSyncClient {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("sync worker panicked");
        }
    }
}

/// Submits edits to a [`LocalSyncClient`]'s world as a different user.
#[derive(Clone)]
pub struct RemoteEditor {
    requests: Sender<Request>,
}

impl MapEditor for RemoteEditor {
    fn submit(&self, edit: Edit) -> Result<(), SyncError> {
        self.requests
            .send(Request::Edit(edit))
            .map_err(|_| SyncError::WorkerGone)
    }
}

/// The worker's side of the link.
struct Link {
    world: MemoryWorld,
    config: LinkConfig,
    events: EventSender,
    shared: Arc<Shared>,
}

impl Link {
    fn run(&mut self, requests: &Receiver<Request>) {
        while let Ok(request) = requests.recv() {
            let delivered = match request {
                Request::Connect {
                    host,
                    port,
                    credentials,
                    reply,
                } => self.connect(&host, port, &credentials, &reply),
                Request::Disconnect => self.disconnect(),
                Request::Resize(capacity) => self.resize(capacity),
                Request::Load(addresses) => self.load(&addresses),
                Request::Edit(edit) => self.edit(edit),
                Request::Shutdown => break,
            };
            if !delivered {
                tracing::debug!("event queue closed, stopping sync worker");
                break;
            }
        }
        self.shared.connected.store(false, Ordering::Release);
    }

    fn session_open(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn with_cache<R>(&self, f: impl FnOnce(&mut BlockCache) -> R) -> Option<R> {
        match self.shared.cache.lock() {
            Ok(mut cache) => Some(f(&mut cache)),
            Err(_) => {
                tracing::error!("block cache lock poisoned");
                None
            }
        }
    }

    fn announce_unloaded(&self, evicted: Vec<BlockAddress>) -> bool {
        evicted
            .into_iter()
            .all(|a| self.events.send(SyncEvent::BlockUnloaded { x: a.x, y: a.y }))
    }

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        credentials: &Credentials,
        reply: &Sender<Result<ConnectInfo, SyncError>>,
    ) -> bool {
        let result = if self.session_open() {
            Err(SyncError::AlreadyConnected)
        } else if !self.config.accepts(credentials) {
            Err(SyncError::AuthenticationFailed(credentials.username.clone()))
        } else {
            Ok(ConnectInfo {
                width: self.world.width(),
                height: self.world.height(),
            })
        };

        let accepted = result.clone().ok();
        match &result {
            Ok(_) => tracing::info!("{} connected to {}:{}", credentials.username, host, port),
            Err(err) => tracing::warn!("connect to {}:{} refused: {}", host, port, err),
        }
        if accepted.is_some() {
            self.shared.connected.store(true, Ordering::Release);
        }
        let _ = reply.send(result);

        match accepted {
            Some(info) => self.events.send(SyncEvent::Connected {
                width: info.width,
                height: info.height,
            }),
            None => true,
        }
    }

    fn disconnect(&mut self) -> bool {
        if !self.session_open() {
            return true;
        }
        self.shared.connected.store(false, Ordering::Release);
        self.with_cache(BlockCache::clear);
        tracing::info!("session closed");
        self.events.send(SyncEvent::Disconnected)
    }

    fn resize(&mut self, capacity: usize) -> bool {
        let evicted = self.with_cache(|c| c.resize(capacity)).unwrap_or_default();
        self.announce_unloaded(evicted)
    }

    fn load(&mut self, addresses: &[BlockAddress]) -> bool {
        if !self.session_open() {
            tracing::warn!("dropping load of {} blocks while disconnected", addresses.len());
            return true;
        }
        if !self.config.load_latency.is_zero() {
            std::thread::sleep(self.config.load_latency);
        }

        let pinned: FxHashSet<BlockAddress> = addresses.iter().copied().collect();
        for &addr in addresses {
            let Some(block) = self.world.block(addr).cloned() else {
                tracing::warn!("requested block ({}, {}) is outside the world", addr.x, addr.y);
                continue;
            };
            let evicted = self
                .with_cache(|c| c.insert(block.clone(), &pinned))
                .unwrap_or_default();
            if !self.announce_unloaded(evicted) || !self.events.send(SyncEvent::BlockLoaded(block)) {
                return false;
            }
        }
        true
    }

    fn edit(&mut self, edit: Edit) -> bool {
        let Some(event) = self.world.apply(edit) else {
            tracing::debug!("edit {:?} did not apply", edit);
            return true;
        };

        let mut subscribed = false;
        for addr in affected_blocks(&edit) {
            if let Some(block) = self.world.block(addr) {
                let cached = self
                    .with_cache(|c| {
                        c.refresh(block);
                        c.contains(addr)
                    })
                    .unwrap_or(false);
                subscribed |= cached;
            }
        }

        if self.session_open() && subscribed {
            self.events.send(event)
        } else {
            true
        }
    }
}

/// Blocks whose contents an edit changes. Elevating land also changes the
/// shared vertex of the tiles west, north and north-west of it.
fn affected_blocks(edit: &Edit) -> Vec<BlockAddress> {
    let mut blocks: Vec<BlockAddress> = match *edit {
        Edit::ReplaceLand { x, y, .. } => vec![TileCoord::new(x, y).block()],
        Edit::ElevateLand { x, y, .. } => {
            let coord = TileCoord::new(x, y);
            [(0, 0), (-1, 0), (0, -1), (-1, -1)]
                .into_iter()
                .filter_map(|(dx, dy)| coord.offset(dx, dy))
                .map(TileCoord::block)
                .collect()
        }
        Edit::AddStatic(tile)
        | Edit::RemoveStatic(tile)
        | Edit::ElevateStatic { tile, .. }
        | Edit::HueStatic { tile, .. } => vec![tile.coord().block()],
        Edit::MoveStatic { tile, x, y } => {
            vec![tile.coord().block(), TileCoord::new(x, y).block()]
        }
    };
    blocks.sort();
    blocks.dedup();
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedar_map::{EventReceiver, event_channel};

    const WAIT: Duration = Duration::from_secs(5);

    fn spawn(world: MemoryWorld, config: LinkConfig) -> (LocalSyncClient, EventReceiver) {
        let (tx, rx) = event_channel(256);
        let client = LocalSyncClient::spawn(world, config, tx).unwrap();
        (client, rx)
    }

    fn connect(client: &mut LocalSyncClient, rx: &EventReceiver) {
        client
            .connect("127.0.0.1", 2597, &Credentials::new("admin", "admin"))
            .unwrap();
        assert!(matches!(rx.recv_timeout(WAIT), Some(SyncEvent::Connected { .. })));
    }

    #[test]
    fn test_connect_reports_world_size() {
        let (mut client, rx) = spawn(MemoryWorld::flat(3, 5), LinkConfig::default());
        assert!(!client.is_connected());
        let info = client
            .connect("localhost", 2597, &Credentials::new("admin", ""))
            .unwrap();
        assert_eq!(info, ConnectInfo { width: 3, height: 5 });
        assert!(client.is_connected());
        assert_eq!(
            rx.recv_timeout(WAIT),
            Some(SyncEvent::Connected { width: 3, height: 5 })
        );
        assert_eq!(
            client.connect("localhost", 2597, &Credentials::default()),
            Err(SyncError::AlreadyConnected)
        );
    }

    #[test]
    fn test_bad_credentials_are_refused() {
        let config = LinkConfig {
            accounts: vec![Credentials::new("admin", "secret")],
            ..LinkConfig::default()
        };
        let (mut client, rx) = spawn(MemoryWorld::flat(1, 1), config);
        let result = client.connect("localhost", 2597, &Credentials::new("admin", "wrong"));
        assert_eq!(result, Err(SyncError::AuthenticationFailed("admin".into())));
        assert!(!client.is_connected());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_load_while_disconnected_is_dropped() {
        let (mut client, rx) = spawn(MemoryWorld::flat(2, 2), LinkConfig::default());
        client.load_blocks(&[BlockAddress::new(0, 0)]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_none());
        assert_eq!(client.cached_blocks(), 0);
    }

    #[test]
    fn test_load_delivers_blocks_and_fills_lookups() {
        let (mut client, rx) = spawn(MemoryWorld::flat(2, 2), LinkConfig::default());
        connect(&mut client, &rx);
        client.resize_cache(4);
        client.load_blocks(&[BlockAddress::new(1, 1), BlockAddress::new(9, 9)]);

        match rx.recv_timeout(WAIT) {
            Some(SyncEvent::BlockLoaded(block)) => {
                assert_eq!(block.address, BlockAddress::new(1, 1));
                assert_eq!(block.land.len(), 64);
            }
            other => panic!("expected block, got {:?}", other),
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_none());
        assert_eq!(client.cached_blocks(), 1);
        assert!(client.land_tile(12, 12).is_some());
        assert!(client.land_tile(0, 0).is_none());
    }

    #[test]
    fn test_resize_unloads_oldest_blocks() {
        let (mut client, rx) = spawn(MemoryWorld::flat(2, 2), LinkConfig::default());
        connect(&mut client, &rx);
        client.resize_cache(4);
        client.load_blocks(&[BlockAddress::new(0, 0), BlockAddress::new(1, 0)]);
        for _ in 0..2 {
            assert!(matches!(rx.recv_timeout(WAIT), Some(SyncEvent::BlockLoaded(_))));
        }
        client.resize_cache(1);
        assert_eq!(
            rx.recv_timeout(WAIT),
            Some(SyncEvent::BlockUnloaded { x: 0, y: 0 })
        );
    }

    #[test]
    fn test_edits_broadcast_only_for_cached_blocks() {
        let (mut client, rx) = spawn(MemoryWorld::flat(2, 1), LinkConfig::default());
        connect(&mut client, &rx);
        client.resize_cache(2);
        client.load_blocks(&[BlockAddress::new(0, 0)]);
        assert!(matches!(rx.recv_timeout(WAIT), Some(SyncEvent::BlockLoaded(_))));

        let remote = client.remote_editor();
        let unseen = StaticTile::new(1, 12, 3, 0, 0);
        let seen = StaticTile::new(2, 3, 3, 0, 0);
        remote.add_static(unseen).unwrap();
        remote.add_static(seen).unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Some(SyncEvent::StaticAdded(seen)));
        assert_eq!(client.static_tiles(3, 3), vec![seen]);

        // Moving into the cached block is announced.
        remote.move_static(unseen, 4, 4).unwrap();
        assert_eq!(
            rx.recv_timeout(WAIT),
            Some(SyncEvent::StaticMoved { tile: unseen, new_x: 4, new_y: 4 })
        );
    }

    #[test]
    fn test_disconnect_clears_peer_cache() {
        let (mut client, rx) = spawn(MemoryWorld::flat(1, 1), LinkConfig::default());
        connect(&mut client, &rx);
        client.resize_cache(1);
        client.load_blocks(&[BlockAddress::new(0, 0)]);
        assert!(matches!(rx.recv_timeout(WAIT), Some(SyncEvent::BlockLoaded(_))));

        client.disconnect();
        assert_eq!(rx.recv_timeout(WAIT), Some(SyncEvent::Disconnected));
        assert!(!client.is_connected());
        assert_eq!(client.cached_blocks(), 0);
        assert_eq!(client.replace_land(0, 0, 5), Err(SyncError::NotConnected));
    }

    #[test]
    fn test_shutdown_returns_edited_world() {
        let (mut client, rx) = spawn(MemoryWorld::flat(1, 1), LinkConfig::default());
        connect(&mut client, &rx);
        client.elevate_land(2, 3, 9).unwrap();
        // Not subscribed to the block, so nothing is broadcast.
        let world = client.shutdown().unwrap();
        assert_eq!(world.land_tile(2, 3).map(|l| l.z), Some(9));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_affected_blocks_for_land_elevation() {
        let blocks = affected_blocks(&Edit::ElevateLand { x: 8, y: 8, z: 1 });
        assert_eq!(
            blocks,
            vec![
                BlockAddress::new(0, 0),
                BlockAddress::new(0, 1),
                BlockAddress::new(1, 0),
                BlockAddress::new(1, 1),
            ]
        );
        let blocks = affected_blocks(&Edit::ElevateLand { x: 0, y: 0, z: 1 });
        assert_eq!(blocks, vec![BlockAddress::new(0, 0)]);
    }
}
