//! The per-tick reconciliation loop tying the view, the store and the sync
//! peer together.
//!
//! Each [`CacheCoordinator::tick`]:
//!
//! 1. recomputes the view range and exits early if it did not change,
//! 2. evicts tiles outside the new range,
//! 3. sizes the peer's cache and requests blocks the range newly needs,
//! 4. fills newly visible coordinates the peer already holds,
//! 5. drains the event queue and applies every event in arrival order.
//!
//! Add and update events only ever touch coordinates inside the current
//! range; removals always apply. Late events for evicted coordinates are
//! therefore harmless.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::coords::{BLOCK_SIZE, BlockAddress, BlockRect, TileCoord, TileRect, WorldBounds};
use crate::events::{EventReceiver, SyncEvent};
use crate::ghost::GhostLayer;
use crate::store::TileStore;
use crate::sync::{ConnectInfo, Credentials, SyncClient, SyncError};
use crate::tile::{BlockData, CachedLand, Corner, DrawOrder, FlatDrawOrder, LandTile, StaticTile};
use crate::view::{Camera, ViewDiff, ViewParams, ViewTracker};

/// Whether a session with the sync peer is open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Reconciliation phase within a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileState {
    /// Waiting for the next tick.
    Idle,
    /// Evicting and requesting after a view range change.
    Reconciling,
}

/// What one [`CacheCoordinator::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The view range differed from the previous tick.
    pub range_changed: bool,
    /// Tiles dropped because they left the view range.
    pub evicted: usize,
    /// Tiles filled from the peer's lookups.
    pub hydrated: usize,
    /// Blocks passed to [`SyncClient::load_blocks`].
    pub requested: usize,
    /// Events drained from the queue and applied.
    pub events_applied: usize,
}

/// Keeps a [`TileStore`] in line with the camera and the sync peer.
pub struct CacheCoordinator<C: SyncClient> {
    /// Must drop before `sync`, whose worker may be blocked on a full queue.
    events: EventReceiver,
    sync: C,
    tracker: ViewTracker,
    camera: Camera,
    store: TileStore,
    ghosts: GhostLayer,
    draw_order: Box<dyn DrawOrder>,
    world: WorldBounds,
    connection: ConnectionState,
    state: ReconcileState,
    /// Blocks the current range needs, margin included.
    region: BlockRect,
    /// Requested and not yet delivered. Pruned to `region`.
    pending: FxHashSet<BlockAddress>,
    /// Delivered blocks and their payload digests. Pruned to `region`.
    loaded: FxHashMap<BlockAddress, u64>,
    /// Outstanding request count per block, including abandoned ones.
    /// Every request is answered, so an entry lives until its last answer
    /// arrives or the session drops. Keys never exceed the world's blocks.
    in_flight: FxHashMap<BlockAddress, u32>,
    /// Needed blocks the peer unloaded; re-requested on the next tick.
    refill: FxHashSet<BlockAddress>,
}

impl<C: SyncClient> CacheCoordinator<C> {
    /// Creates a disconnected coordinator.
    pub fn new(sync: C, events: EventReceiver, params: ViewParams, camera: Camera) -> Self {
        Self {
            sync,
            events,
            tracker: ViewTracker::new(params),
            camera,
            store: TileStore::new(),
            ghosts: GhostLayer::new(),
            draw_order: Box::new(FlatDrawOrder),
            world: WorldBounds::EMPTY,
            connection: ConnectionState::Disconnected,
            state: ReconcileState::Idle,
            region: BlockRect::EMPTY,
            pending: FxHashSet::default(),
            loaded: FxHashMap::default(),
            in_flight: FxHashMap::default(),
            refill: FxHashSet::default(),
        }
    }

    /// Replaces the draw-priority source used to order statics.
    pub fn with_draw_order(mut self, order: Box<dyn DrawOrder>) -> Self {
        self.draw_order = order;
        self
    }

    // -- Connection ---------------------------------------------------------

    /// Opens a session through the sync peer. The cache switches over when
    /// the `Connected` event is applied.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> Result<ConnectInfo, SyncError> {
        self.sync.connect(host, port, credentials)
    }

    /// Closes the session. The cache is cleared when the `Disconnected`
    /// event is applied.
    pub fn disconnect(&mut self) {
        self.sync.disconnect();
    }

    /// Drops every cached tile and shrinks the peer's cache to nothing. The
    /// next tick re-requests the whole view. Requests already sent stay
    /// counted, since their answers still arrive.
    pub fn reset(&mut self) {
        self.clear_cache();
        self.sync.resize_cache(0);
    }

    fn clear_cache(&mut self) {
        self.store.clear();
        self.tracker.reset();
        self.region = BlockRect::EMPTY;
        self.pending.clear();
        self.loaded.clear();
        self.refill.clear();
        self.state = ReconcileState::Idle;
    }

    // -- Tick ---------------------------------------------------------------

    /// Runs one reconciliation pass and applies every queued event.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if let Some(diff) = self.tracker.update(&self.camera, self.world) {
            report.range_changed = true;
            self.state = ReconcileState::Reconciling;
            self.reconcile(&diff, &mut report);
            self.state = ReconcileState::Idle;
        }
        if !self.refill.is_empty() {
            report.requested += self.request_refill();
        }

        for event in self.events.drain() {
            self.apply_event(event);
            report.events_applied += 1;
        }

        if report.range_changed || report.events_applied > 0 {
            tracing::debug!(
                "tick: evicted={} hydrated={} requested={} events={} land={} statics={}",
                report.evicted,
                report.hydrated,
                report.requested,
                report.events_applied,
                self.store.land_count(),
                self.store.static_count()
            );
        }
        report
    }

    fn reconcile(&mut self, diff: &ViewDiff, report: &mut TickReport) {
        report.evicted = self.store.evict_outside(&diff.current).total();

        self.region = diff.region;
        self.pending.retain(|addr| diff.region.contains(*addr));
        self.loaded.retain(|addr, _| diff.region.contains(*addr));

        if self.connection == ConnectionState::Connected {
            let wanted: Vec<BlockAddress> = diff
                .requested
                .iter()
                .copied()
                .filter(|addr| !self.pending.contains(addr) && !self.loaded.contains_key(addr))
                .collect();

            self.sync.resize_cache(cache_capacity(&diff.current, &diff.region));
            report.requested = self.request(wanted);
        }

        report.hydrated = self.hydrate(diff);
    }

    fn request(&mut self, blocks: Vec<BlockAddress>) -> usize {
        if blocks.is_empty() {
            return 0;
        }
        for addr in &blocks {
            self.pending.insert(*addr);
            *self.in_flight.entry(*addr).or_default() += 1;
        }
        self.sync.load_blocks(&blocks);
        blocks.len()
    }

    fn request_refill(&mut self) -> usize {
        let blocks: Vec<BlockAddress> = self
            .refill
            .drain()
            .filter(|addr| self.region.contains(*addr) && !self.pending.contains(addr))
            .collect();
        if self.connection != ConnectionState::Connected {
            return 0;
        }
        tracing::debug!("re-requesting {} unloaded blocks", blocks.len());
        self.request(blocks)
    }

    /// Fills coordinates that just entered the range from the peer's
    /// lookups. Coordinates in pending blocks are left for `BlockLoaded`.
    fn hydrate(&mut self, diff: &ViewDiff) -> usize {
        let entered: Vec<TileCoord> = diff
            .entered()
            .filter(|coord| !self.pending.contains(&coord.block()))
            .collect();

        let no_payload = FxHashMap::default();
        let mut filled = 0;
        for coord in entered {
            if self.store.find_land_at(coord).is_none()
                && let Some(tile) = self.sync.land_tile(coord.x, coord.y)
            {
                let corners = self.resolve_corners(&tile, &no_payload);
                self.store.insert_land(CachedLand::new(tile, corners));
                filled += 1;
            }

            let statics = self.sync.static_tiles(coord.x, coord.y);
            if !statics.is_empty() {
                for tile in statics {
                    if self.store.insert_static(tile) {
                        filled += 1;
                    }
                }
                self.store.sort_cell(coord, self.draw_order.as_ref());
            }
        }
        filled
    }

    // -- Events -------------------------------------------------------------

    /// Applies one event to the cache.
    pub fn apply_event(&mut self, event: SyncEvent) {
        tracing::trace!("applying {}", event.kind());
        match event {
            SyncEvent::Connected { width, height } => {
                tracing::info!("connected, world is {}x{} blocks", width, height);
                self.world = WorldBounds::new(width, height);
                self.connection = ConnectionState::Connected;
                self.reset();
            }
            SyncEvent::Disconnected => {
                tracing::info!("disconnected, clearing cache");
                self.connection = ConnectionState::Disconnected;
                self.world = WorldBounds::EMPTY;
                self.clear_cache();
                self.in_flight.clear();
            }
            SyncEvent::Moved { x, y } => self.camera.center_on_tile(x, y),
            SyncEvent::BlockLoaded(block) => self.on_block_loaded(block),
            SyncEvent::BlockUnloaded { x, y } => {
                let addr = BlockAddress::new(x, y);
                let removed = self.store.remove_block(addr);
                self.loaded.remove(&addr);
                if self.region.contains(addr) && !self.pending.contains(&addr) {
                    self.refill.insert(addr);
                }
                tracing::debug!("block ({}, {}) unloaded, {} tiles dropped", x, y, removed.total());
            }
            SyncEvent::LandReplaced(tile) => self.on_land_replaced(tile),
            SyncEvent::LandElevated(tile) => self.on_land_elevated(tile),
            SyncEvent::StaticAdded(tile) => self.insert_static_in_range(tile),
            SyncEvent::StaticRemoved(tile) => {
                if !self.store.remove_static(&tile) {
                    tracing::debug!("static_removed for uncached {:?}", tile);
                }
            }
            SyncEvent::StaticMoved { tile, new_x, new_y } => {
                self.store.remove_static(&tile);
                self.insert_static_in_range(tile.moved_to(new_x, new_y));
            }
            SyncEvent::StaticElevated { tile, new_z } => {
                self.store.remove_static(&tile);
                self.insert_static_in_range(tile.elevated_to(new_z));
            }
            SyncEvent::StaticHued { tile, new_hue } => match self.store.static_mut(&tile) {
                Some(cached) => cached.hue = new_hue,
                None => tracing::debug!("static_hued for uncached {:?}", tile),
            },
        }
    }

    fn on_block_loaded(&mut self, block: BlockData) {
        let addr = block.address;
        let requested = self.take_in_flight(addr);

        if !self.region.contains(addr) {
            tracing::debug!("discarding block ({}, {}) outside the view", addr.x, addr.y);
            self.pending.remove(&addr);
            return;
        }

        let digest = block.digest();
        let conflict = !requested && self.loaded.get(&addr).is_some_and(|&d| d != digest);
        if conflict {
            tracing::error!(
                "block ({}, {}) reloaded with different contents and no request outstanding",
                addr.x,
                addr.y
            );
        }
        debug_assert!(!conflict, "conflicting reload of block ({}, {})", addr.x, addr.y);

        let mut payload: FxHashMap<TileCoord, i8> = FxHashMap::default();
        for land in &block.land {
            let duplicate = payload.insert(land.coord(), land.z).is_some();
            if duplicate {
                tracing::error!(
                    "block ({}, {}) carries two land tiles at {:?}",
                    addr.x,
                    addr.y,
                    land.coord()
                );
            }
            debug_assert!(!duplicate, "duplicate land tile at {:?}", land.coord());
        }

        self.store.remove_block(addr);
        let range = self.tracker.current();

        for land in &block.land {
            if range.contains(land.coord()) {
                let corners = self.resolve_corners(land, &payload);
                self.store.insert_land(CachedLand::new(*land, corners));
            }
        }

        let mut touched: FxHashSet<TileCoord> = FxHashSet::default();
        for tile in &block.statics {
            if range.contains(tile.coord()) && self.store.insert_static(*tile) {
                touched.insert(tile.coord());
            }
        }
        for coord in touched {
            self.store.sort_cell(coord, self.draw_order.as_ref());
        }

        self.refresh_border(addr, &payload, &range);

        self.loaded.insert(addr, digest);
        self.pending.remove(&addr);
    }

    /// Re-resolves the corners of cached tiles just west and north of a
    /// freshly loaded block, whose east and south vertices live in it.
    fn refresh_border(&mut self, addr: BlockAddress, payload: &FxHashMap<TileCoord, i8>, range: &TileRect) {
        let origin = addr.origin();
        let mut border = Vec::with_capacity(2 * usize::from(BLOCK_SIZE) + 1);
        if origin.x > 0 {
            border.extend((0..BLOCK_SIZE).map(|dy| TileCoord::new(origin.x - 1, origin.y + dy)));
        }
        if origin.y > 0 {
            border.extend((0..BLOCK_SIZE).map(|dx| TileCoord::new(origin.x + dx, origin.y - 1)));
            if origin.x > 0 {
                border.push(TileCoord::new(origin.x - 1, origin.y - 1));
            }
        }

        for coord in border {
            if !range.contains(coord) {
                continue;
            }
            let Some(land) = self.store.find_land_at(coord) else {
                continue;
            };
            let tile = *land.tile();
            let corners = self.resolve_corners(&tile, payload);
            self.store.insert_land(CachedLand::new(tile, corners));
        }
    }

    fn on_land_replaced(&mut self, tile: LandTile) {
        let coord = tile.coord();
        match self.store.land_mut(coord) {
            Some(land) => land.set_id(tile.id),
            None => tracing::debug!("land_replaced for uncached {:?}", coord),
        }
    }

    /// Writes the new height into the shared vertex of the up to four tiles
    /// meeting at the elevated coordinate.
    fn on_land_elevated(&mut self, tile: LandTile) {
        let coord = tile.coord();
        for corner in Corner::ALL {
            let (dx, dy) = corner.owner_offset();
            if let Some(owner) = coord.offset(dx, dy)
                && let Some(land) = self.store.land_mut(owner)
            {
                land.set_corner(corner, tile.z);
            }
        }
    }

    fn insert_static_in_range(&mut self, tile: StaticTile) {
        let coord = tile.coord();
        if !self.tracker.current().contains(coord) {
            return;
        }
        if self.store.insert_static(tile) {
            self.store.sort_cell(coord, self.draw_order.as_ref());
        }
    }

    fn take_in_flight(&mut self, addr: BlockAddress) -> bool {
        match self.in_flight.get_mut(&addr) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.in_flight.remove(&addr);
                true
            }
            None => false,
        }
    }

    fn resolve_corners(&self, tile: &LandTile, payload: &FxHashMap<TileCoord, i8>) -> [i8; 4] {
        let mut corners = [tile.z; 4];
        for corner in Corner::ALL {
            let (dx, dy) = corner.source_offset();
            if let Some(source) = tile.coord().offset(dx, dy)
                && let Some(z) = self.elevation_at(source, payload)
            {
                corners[corner as usize] = z;
            }
        }
        corners
    }

    fn elevation_at(&self, coord: TileCoord, payload: &FxHashMap<TileCoord, i8>) -> Option<i8> {
        payload
            .get(&coord)
            .copied()
            .or_else(|| self.sync.land_tile(coord.x, coord.y).map(|l| l.z))
            .or_else(|| self.store.find_land_at(coord).map(|l| l.tile().z))
    }

    // -- Ghosts -------------------------------------------------------------

    /// Replaces the ghost preview. Ghosts bypass reconciliation entirely.
    pub fn set_ghost_tiles(&mut self, land: Vec<LandTile>, statics: Vec<StaticTile>) {
        self.ghosts.set(land, statics);
    }

    pub fn clear_ghost_tiles(&mut self) {
        self.ghosts.clear();
    }

    pub fn ghosts(&self) -> &GhostLayer {
        &self.ghosts
    }

    // -- Accessors ----------------------------------------------------------

    /// The cached tiles. Read-only; only events and ticks mutate the store.
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// The tile rectangle currently kept resident.
    pub fn view_range(&self) -> TileRect {
        self.tracker.current()
    }

    /// The blocks the current range needs, margin included.
    pub fn request_region(&self) -> BlockRect {
        self.region
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn world_bounds(&self) -> WorldBounds {
        self.world
    }

    pub fn is_pending(&self, addr: BlockAddress) -> bool {
        self.pending.contains(&addr)
    }

    pub fn is_loaded(&self, addr: BlockAddress) -> bool {
        self.loaded.contains_key(&addr)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn sync(&self) -> &C {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut C {
        &mut self.sync
    }
}

/// Capacity asked of the peer for a range: one block per eight tiles of the
/// range, and never less than the request region.
fn cache_capacity(range: &TileRect, region: &BlockRect) -> usize {
    let headroom = usize::try_from(range.area() / 8).unwrap_or(usize::MAX);
    headroom.max(region.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSender, event_channel};
    use crate::view::TILE_SIZE;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Resize(usize),
        Load(Vec<BlockAddress>),
    }

    /// Records every request. With `serves_world` set it answers lookups
    /// for any coordinate from [`world_land`] and [`world_statics`].
    #[derive(Default)]
    struct RecordingClient {
        calls: Vec<Call>,
        serves_world: bool,
    }

    impl RecordingClient {
        fn loads(&self) -> Vec<Vec<BlockAddress>> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Load(addrs) => Some(addrs.clone()),
                    Call::Resize(_) => None,
                })
                .collect()
        }

        fn take_loads(&mut self) -> Vec<BlockAddress> {
            let loads = self.loads().concat();
            self.calls.clear();
            loads
        }
    }

    impl SyncClient for RecordingClient {
        fn connect(&mut self, _: &str, _: u16, _: &Credentials) -> Result<ConnectInfo, SyncError> {
            Ok(ConnectInfo { width: 2, height: 2 })
        }

        fn disconnect(&mut self) {}

        fn is_connected(&self) -> bool {
            true
        }

        fn resize_cache(&mut self, capacity: usize) {
            self.calls.push(Call::Resize(capacity));
        }

        fn load_blocks(&mut self, addresses: &[BlockAddress]) {
            self.calls.push(Call::Load(addresses.to_vec()));
        }

        fn land_tile(&self, x: u16, y: u16) -> Option<LandTile> {
            self.serves_world.then(|| world_land(x, y))
        }

        fn static_tiles(&self, x: u16, y: u16) -> Vec<StaticTile> {
            if self.serves_world {
                world_statics(x, y)
            } else {
                Vec::new()
            }
        }
    }

    fn world_land(x: u16, y: u16) -> LandTile {
        LandTile::new(x, y, 0, 3 + (x + y) % 4)
    }

    fn world_statics(x: u16, y: u16) -> Vec<StaticTile> {
        if x % 8 == 0 && y % 8 == 0 {
            vec![StaticTile::new(0x0EED, x, y, 5, 0)]
        } else {
            Vec::new()
        }
    }

    fn world_block(addr: BlockAddress) -> BlockData {
        let mut block = BlockData::new(addr);
        for coord in addr.tiles().iter() {
            block.land.push(world_land(coord.x, coord.y));
            block.statics.extend(world_statics(coord.x, coord.y));
        }
        block
    }

    fn setup(width: u16, height: u16, tile: (u16, u16)) -> (CacheCoordinator<RecordingClient>, EventSender) {
        let (tx, rx) = event_channel(1024);
        let mut camera = Camera::new(1280, 720);
        camera.center_on_tile(tile.0, tile.1);
        let mut coordinator =
            CacheCoordinator::new(RecordingClient::default(), rx, ViewParams::default(), camera);
        coordinator.apply_event(SyncEvent::Connected { width, height });
        coordinator.sync_mut().calls.clear();
        (coordinator, tx)
    }

    fn deliver_requested(coordinator: &mut CacheCoordinator<RecordingClient>) {
        for addr in coordinator.sync_mut().take_loads() {
            coordinator.apply_event(SyncEvent::BlockLoaded(world_block(addr)));
        }
    }

    fn land_snapshot(store: &TileStore) -> Vec<(TileCoord, u16, [i8; 4])> {
        let mut land: Vec<_> = store
            .land_tiles()
            .map(|l| (l.coord(), l.tile().id, l.corners()))
            .collect();
        land.sort();
        land
    }

    fn static_snapshot(store: &TileStore) -> Vec<(TileCoord, u16, i8, u16)> {
        let mut statics: Vec<_> = store
            .static_tiles()
            .map(|s| (s.coord(), s.id, s.z, s.hue))
            .collect();
        statics.sort();
        statics
    }

    fn assert_store_matches_range(coordinator: &CacheCoordinator<RecordingClient>) {
        let range = coordinator.view_range();
        let mut expected: Vec<TileCoord> = range.iter().collect();
        expected.sort();
        let mut cached: Vec<TileCoord> = coordinator.store().land_tiles().map(|l| l.coord()).collect();
        cached.sort();
        assert_eq!(cached, expected);

        let expected_statics = range.iter().filter(|c| c.x % 8 == 0 && c.y % 8 == 0).count();
        assert_eq!(coordinator.store().static_count(), expected_statics);
        assert!(coordinator.store().static_tiles().all(|s| range.contains(s.coord())));
    }

    #[test]
    fn test_initial_range_requests_every_block_once() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        let report = coordinator.tick();
        assert!(report.range_changed);
        assert_eq!(report.requested, 4);
        assert_eq!(coordinator.view_range(), TileRect::new(0, 0, 16, 16));

        let mut loads = coordinator.sync().loads();
        assert_eq!(loads.len(), 1);
        loads[0].sort();
        assert_eq!(
            loads[0],
            vec![
                BlockAddress::new(0, 0),
                BlockAddress::new(0, 1),
                BlockAddress::new(1, 0),
                BlockAddress::new(1, 1),
            ]
        );

        // Unchanged view: no further requests.
        coordinator.camera_mut().move_by(0.5, 0.5);
        let report = coordinator.tick();
        assert!(!report.range_changed);
        assert_eq!(coordinator.sync().loads().len(), 1);
    }

    #[test]
    fn test_resize_precedes_load() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        let calls = &coordinator.sync().calls;
        assert_eq!(calls[0], Call::Resize(32));
        assert!(matches!(calls[1], Call::Load(_)));
    }

    #[test]
    fn test_loaded_block_and_static_removal() {
        let (mut coordinator, tx) = setup(2, 2, (0, 0));
        coordinator.tick();

        let mut block = BlockData::new(BlockAddress::new(0, 0));
        block.land.push(LandTile::new(2, 3, 0, 4));
        let stat = StaticTile::new(0x1CD9, 2, 3, 0, 0);
        block.statics.push(stat);
        tx.send(SyncEvent::BlockLoaded(block));
        let report = coordinator.tick();
        assert_eq!(report.events_applied, 1);

        let store = coordinator.store();
        assert_eq!(store.land_count(), 1);
        assert_eq!(store.static_count(), 1);
        assert_eq!(store.find_land_at(TileCoord::new(2, 3)).map(|l| l.tile().id), Some(4));
        assert_eq!(store.find_static_at(TileCoord::new(2, 3)), &[stat]);
        assert!(coordinator.is_loaded(BlockAddress::new(0, 0)));
        assert!(!coordinator.is_pending(BlockAddress::new(0, 0)));

        tx.send(SyncEvent::StaticRemoved(stat));
        coordinator.tick();
        assert_eq!(coordinator.store().land_count(), 1);
        assert_eq!(coordinator.store().static_count(), 0);
    }

    #[test]
    fn test_store_tracks_view_range_while_panning() {
        let (mut coordinator, _tx) = setup(16, 16, (40, 40));
        coordinator.tick();
        deliver_requested(&mut coordinator);
        assert_store_matches_range(&coordinator);

        coordinator.camera_mut().move_by(16.0 * TILE_SIZE, 0.0);
        coordinator.sync_mut().serves_world = true;
        let report = coordinator.tick();
        assert!(report.evicted > 0);
        assert!(report.hydrated > 0);
        assert!(report.requested > 0);
        deliver_requested(&mut coordinator);
        assert_store_matches_range(&coordinator);

        coordinator.camera_mut().move_by(-5.0 * TILE_SIZE, 9.0 * TILE_SIZE);
        coordinator.tick();
        deliver_requested(&mut coordinator);
        assert_store_matches_range(&coordinator);
    }

    #[test]
    fn test_block_loaded_twice_is_idempotent() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        let block = world_block(BlockAddress::new(1, 0));
        coordinator.apply_event(SyncEvent::BlockLoaded(block.clone()));
        let land = land_snapshot(coordinator.store());
        let statics = static_snapshot(coordinator.store());

        coordinator.apply_event(SyncEvent::BlockLoaded(block));
        assert_eq!(land_snapshot(coordinator.store()), land);
        assert_eq!(static_snapshot(coordinator.store()), statics);
    }

    #[test]
    fn test_block_outside_region_is_discarded() {
        let (mut coordinator, _tx) = setup(16, 16, (0, 0));
        coordinator.tick();
        let far = BlockAddress::new(15, 15);
        assert!(!coordinator.request_region().contains(far));
        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(far)));
        assert!(coordinator.store().is_empty());
        assert!(!coordinator.is_loaded(far));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "conflicting reload")]
    fn test_conflicting_reload_asserts_in_debug() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        let addr = BlockAddress::new(0, 0);
        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(addr)));
        let mut changed = world_block(addr);
        changed.land[0].id = 999;
        coordinator.apply_event(SyncEvent::BlockLoaded(changed));
    }

    #[test]
    fn test_static_moved_then_evicted_leaves_no_trace() {
        let (mut coordinator, tx) = setup(16, 16, (40, 40));
        coordinator.tick();
        let range = coordinator.view_range();
        let tile = StaticTile::new(0x1CD9, 20, 20, 0, 0);
        let (dest_x, dest_y) = (range.left as u16 + 1, 20);

        tx.send(SyncEvent::StaticAdded(tile));
        tx.send(SyncEvent::StaticMoved { tile, new_x: dest_x, new_y: dest_y });
        coordinator.tick();
        assert_eq!(coordinator.store().find_static_at(TileCoord::new(dest_x, dest_y)).len(), 1);

        coordinator.camera_mut().move_by(10.0 * TILE_SIZE, 0.0);
        coordinator.tick();
        assert!(!coordinator.view_range().contains(TileCoord::new(dest_x, dest_y)));
        assert!(coordinator.store().find_static_at(TileCoord::new(20, 20)).is_empty());
        assert!(coordinator.store().find_static_at(TileCoord::new(dest_x, dest_y)).is_empty());
        assert_eq!(coordinator.store().static_count(), 0);
    }

    #[test]
    fn test_late_add_outside_range_is_ignored() {
        let (mut coordinator, _tx) = setup(16, 16, (0, 0));
        coordinator.tick();
        coordinator.apply_event(SyncEvent::StaticAdded(StaticTile::new(1, 120, 120, 0, 0)));
        coordinator.apply_event(SyncEvent::LandReplaced(LandTile::new(120, 120, 0, 9)));
        assert!(coordinator.store().is_empty());
    }

    #[test]
    fn test_land_elevated_touches_four_shared_vertices() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(BlockAddress::new(0, 0))));
        let before = land_snapshot(coordinator.store());

        coordinator.apply_event(SyncEvent::LandElevated(LandTile::new(5, 5, 10, 0)));

        let store = coordinator.store();
        let at = |x, y| store.find_land_at(TileCoord::new(x, y)).copied().unwrap();
        assert_eq!(at(5, 5).corner(Corner::Top), 10);
        assert_eq!(at(5, 5).tile().z, 10);
        assert_eq!(at(4, 5).corner(Corner::Right), 10);
        assert_eq!(at(5, 4).corner(Corner::Left), 10);
        assert_eq!(at(4, 4).corner(Corner::Bottom), 10);

        let after = land_snapshot(store);
        let changed: Vec<TileCoord> = before
            .iter()
            .zip(&after)
            .filter(|(b, a)| b != a)
            .map(|(_, a)| a.0)
            .collect();
        assert_eq!(
            changed,
            vec![
                TileCoord::new(4, 4),
                TileCoord::new(4, 5),
                TileCoord::new(5, 4),
                TileCoord::new(5, 5),
            ]
        );
        // Each changed tile moved exactly one vertex.
        for (b, a) in before.iter().zip(&after).filter(|(b, a)| b != a) {
            let moved = b.2.iter().zip(a.2.iter()).filter(|(x, y)| x != y).count();
            assert_eq!(moved, 1);
        }
    }

    #[test]
    fn test_corners_resolved_from_payload_and_border() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();

        let mut west = world_block(BlockAddress::new(0, 0));
        for land in &mut west.land {
            land.z = 1;
        }
        coordinator.apply_event(SyncEvent::BlockLoaded(west));
        let edge = coordinator.store().find_land_at(TileCoord::new(7, 3)).copied().unwrap();
        assert!(edge.is_flat());

        let mut east = world_block(BlockAddress::new(1, 0));
        for land in &mut east.land {
            land.z = 4;
        }
        coordinator.apply_event(SyncEvent::BlockLoaded(east));

        // The west block's edge tile now slopes towards the east block.
        let edge = coordinator.store().find_land_at(TileCoord::new(7, 3)).copied().unwrap();
        assert_eq!(edge.corners(), [1, 4, 1, 4]);
        assert!(!edge.is_flat());
        let inner = coordinator.store().find_land_at(TileCoord::new(8, 3)).copied().unwrap();
        assert!(inner.is_flat());
    }

    #[test]
    fn test_land_replaced_updates_id_only() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(BlockAddress::new(0, 0))));
        coordinator.apply_event(SyncEvent::LandReplaced(LandTile::new(2, 2, 50, 77)));
        let land = coordinator.store().find_land_at(TileCoord::new(2, 2)).copied().unwrap();
        assert_eq!(land.tile().id, 77);
        assert_eq!(land.tile().z, 0);
    }

    #[test]
    fn test_reset_keeps_outstanding_requests_counted() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        coordinator.reset();
        coordinator.tick();
        let addr = BlockAddress::new(0, 0);
        assert_eq!(coordinator.in_flight.get(&addr), Some(&2));

        // The answer to the first request arrives, then the answer to the
        // second one carries an edit made on the server in between.
        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(addr)));
        let mut edited = world_block(addr);
        edited.land[0].id = 900;
        let coord = edited.land[0].coord();
        coordinator.apply_event(SyncEvent::BlockLoaded(edited));

        assert!(coordinator.is_loaded(addr));
        assert!(!coordinator.in_flight.contains_key(&addr));
        let land = coordinator.store().find_land_at(coord).copied().unwrap();
        assert_eq!(land.tile().id, 900);
    }

    #[test]
    fn test_abandoned_requests_drain_when_answered() {
        let (mut coordinator, _tx) = setup(64, 64, (0, 0));
        coordinator.tick();
        let first = coordinator.sync_mut().take_loads();
        coordinator.camera_mut().center_on_tile(300, 300);
        coordinator.tick();
        let second = coordinator.sync_mut().take_loads();
        assert_eq!(coordinator.in_flight.len(), first.len() + second.len());

        for addr in first.into_iter().chain(second) {
            coordinator.apply_event(SyncEvent::BlockLoaded(world_block(addr)));
        }
        assert!(coordinator.in_flight.is_empty());
        assert_store_matches_range(&coordinator);
    }

    #[test]
    fn test_disconnect_forgets_outstanding_requests() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        assert!(!coordinator.in_flight.is_empty());
        coordinator.apply_event(SyncEvent::Disconnected);
        assert!(coordinator.in_flight.is_empty());
    }

    #[test]
    fn test_land_replaced_uncached_is_noop() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        let addr = BlockAddress::new(0, 0);
        coordinator.apply_event(SyncEvent::LandReplaced(LandTile::new(2, 3, 0, 77)));
        assert!(coordinator.store().find_land_at(TileCoord::new(2, 3)).is_none());
        assert!(coordinator.store().is_empty());
        assert!(!coordinator.is_loaded(addr));

        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(addr)));
        let land = coordinator.store().find_land_at(TileCoord::new(2, 3)).copied().unwrap();
        assert_eq!(land.tile().id, world_land(2, 3).id);
    }

    #[test]
    fn test_static_hue_is_updated_in_place() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        let tile = StaticTile::new(0x1CD9, 3, 3, 0, 0);
        coordinator.apply_event(SyncEvent::StaticAdded(tile));
        coordinator.apply_event(SyncEvent::StaticHued { tile, new_hue: 5 });

        let hued = StaticTile { hue: 5, ..tile };
        assert_eq!(coordinator.store().find_static_at(tile.coord()), &[hued]);

        // Hue changes in place, so the pre-hue tuple no longer matches.
        coordinator.apply_event(SyncEvent::StaticRemoved(tile));
        assert_eq!(coordinator.store().static_count(), 1);
        coordinator.apply_event(SyncEvent::StaticRemoved(hued));
        assert_eq!(coordinator.store().static_count(), 0);
    }

    #[test]
    fn test_static_elevated_keeps_draw_order() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        let low = StaticTile::new(1, 4, 4, 0, 0);
        let high = StaticTile::new(2, 4, 4, 10, 0);
        coordinator.apply_event(SyncEvent::StaticAdded(high));
        coordinator.apply_event(SyncEvent::StaticAdded(low));
        coordinator.apply_event(SyncEvent::StaticElevated { tile: low, new_z: 20 });

        let ids: Vec<u16> = coordinator
            .store()
            .find_static_at(TileCoord::new(4, 4))
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_duplicate_static_added_is_noop() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        let tile = StaticTile::new(7, 1, 1, 0, 0);
        coordinator.apply_event(SyncEvent::StaticAdded(tile));
        coordinator.apply_event(SyncEvent::StaticAdded(tile));
        assert_eq!(coordinator.store().static_count(), 1);
    }

    #[test]
    fn test_disconnect_then_reconnect_requests_everything() {
        let (mut coordinator, tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        deliver_requested(&mut coordinator);
        assert!(!coordinator.store().is_empty());

        tx.send(SyncEvent::Disconnected);
        coordinator.tick();
        assert!(coordinator.store().is_empty());
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
        assert_eq!(coordinator.world_bounds(), WorldBounds::EMPTY);

        // Nothing is requested while offline.
        coordinator.tick();
        assert!(coordinator.sync().loads().is_empty());

        tx.send(SyncEvent::Connected { width: 2, height: 2 });
        coordinator.tick();
        assert!(coordinator.store().is_empty());
        assert_eq!(coordinator.sync().calls, vec![Call::Resize(0)]);

        coordinator.tick();
        let mut loads = coordinator.sync().loads().concat();
        loads.sort();
        let mut expected: Vec<BlockAddress> = WorldBounds::new(2, 2).blocks().iter().collect();
        expected.sort();
        assert_eq!(loads, expected);
    }

    #[test]
    fn test_stuck_request_is_reissued_when_view_returns() {
        let (mut coordinator, _tx) = setup(16, 16, (40, 40));
        coordinator.tick();
        let block = BlockAddress::new(1, 1);
        assert!(coordinator.sync_mut().take_loads().contains(&block));
        assert!(coordinator.is_pending(block));

        coordinator.camera_mut().center_on_tile(110, 110);
        coordinator.tick();
        assert!(!coordinator.is_pending(block));
        assert!(!coordinator.sync_mut().take_loads().contains(&block));

        coordinator.camera_mut().center_on_tile(40, 40);
        coordinator.tick();
        assert!(coordinator.sync_mut().take_loads().contains(&block));

        // A late delivery from the abandoned request is still accepted.
        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(block)));
        coordinator.apply_event(SyncEvent::BlockLoaded(world_block(block)));
        assert!(coordinator.is_loaded(block));
    }

    #[test]
    fn test_block_unloaded_drops_tiles() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        deliver_requested(&mut coordinator);
        assert_eq!(coordinator.store().land_count(), 256);

        coordinator.apply_event(SyncEvent::BlockUnloaded { x: 1, y: 1 });
        assert_eq!(coordinator.store().land_count(), 192);
        assert!(!coordinator.is_loaded(BlockAddress::new(1, 1)));
        assert!(coordinator.store().find_land_at(TileCoord::new(12, 12)).is_none());

        // Still needed, so the next tick asks for it again.
        let report = coordinator.tick();
        assert_eq!(report.requested, 1);
        assert_eq!(coordinator.sync().loads(), vec![vec![BlockAddress::new(1, 1)]]);
        deliver_requested(&mut coordinator);
        assert_eq!(coordinator.store().land_count(), 256);
    }

    #[test]
    fn test_cache_capacity_has_headroom() {
        let range = TileRect::new(0, 0, 64, 64);
        assert_eq!(cache_capacity(&range, &BlockRect::new(0, 0, 10, 10)), 512);
        let narrow = TileRect::new(0, 0, 8, 8);
        assert_eq!(cache_capacity(&narrow, &BlockRect::new(0, 0, 3, 3)), 9);
    }

    #[test]
    fn test_moved_recentres_camera() {
        let (mut coordinator, tx) = setup(16, 16, (0, 0));
        coordinator.tick();
        tx.send(SyncEvent::Moved { x: 64, y: 64 });
        coordinator.tick();
        assert_eq!(coordinator.camera().tile_position(), TileCoord::new(64, 64));
        let report = coordinator.tick();
        assert!(report.range_changed);
        assert!(coordinator.view_range().contains(TileCoord::new(64, 64)));
    }

    #[test]
    fn test_ghosts_survive_reconciliation_and_disconnect() {
        let (mut coordinator, tx) = setup(2, 2, (0, 0));
        coordinator.set_ghost_tiles(vec![LandTile::new(100, 100, 0, 1)], vec![]);
        coordinator.tick();
        tx.send(SyncEvent::Disconnected);
        coordinator.tick();
        assert_eq!(coordinator.ghosts().land().len(), 1);
        coordinator.clear_ghost_tiles();
        assert!(coordinator.ghosts().is_empty());
    }

    #[test]
    fn test_state_returns_to_idle() {
        let (mut coordinator, _tx) = setup(2, 2, (0, 0));
        coordinator.tick();
        assert_eq!(coordinator.state(), ReconcileState::Idle);
    }
}
