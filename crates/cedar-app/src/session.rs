//! An editing session: a coordinator wired to the loopback peer and driven
//! at a fixed rate.

use std::fmt;
use std::time::{Duration, Instant};

use cedar_config::{Config, ViewConfig, WorldConfig};
use cedar_map::{
    CacheCoordinator, Camera, Credentials, MIN_ZOOM, TILE_SIZE, TickReport, ViewParams,
    event_channel,
};
use cedar_sync::{LinkConfig, LocalSyncClient, MemoryWorld};

use crate::error::AppError;
use crate::tick_loop::TickLoop;

/// The configured world file, or a generated one.
pub fn open_world(config: &WorldConfig) -> Result<MemoryWorld, AppError> {
    match &config.path {
        Some(path) => Ok(MemoryWorld::load(path)?),
        None => {
            tracing::info!(
                "Generating {}x{} block world (seed {:#x})",
                config.width_blocks,
                config.height_blocks,
                config.seed
            );
            Ok(MemoryWorld::generate(
                config.width_blocks,
                config.height_blocks,
                config.seed,
            ))
        }
    }
}

pub fn view_params(view: &ViewConfig) -> ViewParams {
    ViewParams {
        tile_margin: view.tile_margin,
        block_margin: view.block_margin,
    }
}

pub fn camera(view: &ViewConfig) -> Camera {
    let mut camera = Camera::new(view.screen_width, view.screen_height);
    camera.zoom = view.zoom.max(MIN_ZOOM);
    camera
}

pub fn link_config(config: &Config) -> LinkConfig {
    LinkConfig {
        accounts: Vec::new(),
        load_latency: Duration::from_millis(config.world.load_latency_ms),
    }
}

/// Running totals over a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub ticks: u64,
    pub range_changes: u64,
    pub blocks_requested: u64,
    pub tiles_hydrated: u64,
    pub events_applied: u64,
    pub land_tiles: usize,
    pub static_tiles: usize,
    /// Highest cached land elevation, if anything is cached.
    pub highest_land: Option<i8>,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ticks, {} range changes, {} blocks requested, {} tiles hydrated, \
             {} events applied; cached {} land / {} statics",
            self.ticks,
            self.range_changes,
            self.blocks_requested,
            self.tiles_hydrated,
            self.events_applied,
            self.land_tiles,
            self.static_tiles
        )?;
        if let Some(z) = self.highest_land {
            write!(f, ", highest land z {z}")?;
        }
        Ok(())
    }
}

/// A connected coordinator plus a constant camera pan per step.
pub struct Session {
    coordinator: CacheCoordinator<LocalSyncClient>,
    /// Pan per step, in tiles.
    pan: (f32, f32),
    summary: SessionSummary,
}

impl Session {
    /// Spawns the peer over `world`, centres the camera on the world and
    /// connects.
    pub fn start(
        world: MemoryWorld,
        config: &Config,
        credentials: &Credentials,
    ) -> Result<Self, AppError> {
        let bounds = world.bounds();
        let (tx, rx) = event_channel(config.cache.event_queue_capacity.max(1));
        let client = LocalSyncClient::spawn(world, link_config(config), tx).map_err(AppError::Spawn)?;

        let mut camera = camera(&config.view);
        let centre = |tiles: u32| u16::try_from(tiles / 2).unwrap_or(u16::MAX);
        camera.center_on_tile(centre(bounds.tile_width()), centre(bounds.tile_height()));

        let mut coordinator = CacheCoordinator::new(client, rx, view_params(&config.view), camera);
        let info = coordinator.connect(
            &config.network.server_address,
            config.network.server_port,
            credentials,
        )?;
        tracing::info!(
            "Session open as '{}' on {}x{} blocks",
            credentials.username,
            info.width,
            info.height
        );

        Ok(Self {
            coordinator,
            pan: (0.0, 0.0),
            summary: SessionSummary::default(),
        })
    }

    /// Pans the camera by `(dx, dy)` tiles every step.
    pub fn with_pan(mut self, dx: f32, dy: f32) -> Self {
        self.pan = (dx, dy);
        self
    }

    /// One coordinator pass.
    pub fn step(&mut self) -> TickReport {
        if self.pan != (0.0, 0.0) {
            self.coordinator
                .camera_mut()
                .move_by(self.pan.0 * TILE_SIZE, self.pan.1 * TILE_SIZE);
        }
        let report = self.coordinator.tick();
        self.summary.ticks += 1;
        self.summary.range_changes += u64::from(report.range_changed);
        self.summary.blocks_requested += report.requested as u64;
        self.summary.tiles_hydrated += report.hydrated as u64;
        self.summary.events_applied += report.events_applied as u64;
        report
    }

    /// Runs `ticks` steps paced at the fixed rate.
    pub fn run(&mut self, ticks: u64) {
        let mut tick_loop = TickLoop::new();
        let mut done = 0;
        while done < ticks {
            tick_loop.tick(|_| {
                if done < ticks {
                    self.step();
                    done += 1;
                }
            });
            std::thread::sleep(tick_loop.until_next_step());
        }
        tracing::debug!("ran {} steps over {} frames", tick_loop.step_count(), tick_loop.frame_count());
    }

    /// Keeps ticking without panning until no block request is outstanding.
    pub fn settle(&mut self, timeout: Duration) -> Result<(), AppError> {
        let deadline = Instant::now() + timeout;
        let pan = std::mem::take(&mut self.pan);
        loop {
            self.step();
            if self.coordinator.pending_count() == 0 && !self.coordinator.view_range().is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                self.pan = pan;
                return Err(AppError::Timeout {
                    seconds: timeout.as_secs(),
                    waiting_for: format!("{} blocks", self.coordinator.pending_count()),
                });
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.pan = pan;
        Ok(())
    }

    /// Totals so far plus what the store currently holds.
    pub fn summary(&self) -> SessionSummary {
        let store = self.coordinator.store();
        SessionSummary {
            land_tiles: store.land_count(),
            static_tiles: store.static_count(),
            highest_land: store.land_values().map(|l| l.z).max(),
            ..self.summary
        }
    }

    pub fn coordinator(&self) -> &CacheCoordinator<LocalSyncClient> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut CacheCoordinator<LocalSyncClient> {
        &mut self.coordinator
    }

    /// Disconnects and waits for the peer to confirm.
    pub fn close(mut self, timeout: Duration) -> SessionSummary {
        let summary = self.summary();
        self.coordinator.disconnect();
        let deadline = Instant::now() + timeout;
        while self.coordinator.connection_state() == cedar_map::ConnectionState::Connected
            && Instant::now() < deadline
        {
            self.coordinator.tick();
            std::thread::sleep(Duration::from_millis(2));
        }
        tracing::info!("Session closed");
        summary
    }
}
