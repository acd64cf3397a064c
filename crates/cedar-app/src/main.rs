//! `cedar`: headless driver and maintenance tools for the map cache.
//!
//! Run with: `cargo run -p cedar-app -- session --ticks 600 --pan-x 0.2`

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use cedar_app::AppError;
use cedar_app::dedupe::{dedupe_statics, parse_area, parse_ids};
use cedar_app::platform::PlatformDirs;
use cedar_app::session::{Session, link_config, open_world};
use cedar_config::{CliArgs, Config};
use cedar_map::{Credentials, SyncClient, WorldBounds, event_channel};
use cedar_sync::{LocalSyncClient, MemoryWorld};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cedar", about = "Viewport-driven map cache client")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and drive the cache at 60 Hz, panning the camera each tick.
    Session {
        #[arg(long, default_value_t = 600)]
        ticks: u64,
        /// Tiles panned east per tick.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        pan_x: f32,
        /// Tiles panned south per tick.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        pan_y: f32,
    },
    /// Remove stacked duplicate statics in an area.
    Dedupe {
        /// Area corners, inclusive: x1,y1,x2,y2.
        #[arg(long)]
        area: String,
        /// Graphic ids to deduplicate.
        #[arg(long, default_value = "0x1CD9,0x1CDA,0x1CDB,0x1CDC")]
        ids: String,
    },
    /// Write a generated world to a RON file.
    GenerateWorld {
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("cedar: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let dirs = match &cli.args.config {
        Some(root) => PlatformDirs::with_root(root),
        None => PlatformDirs::resolve()?,
    };
    dirs.create_dirs()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(&cli.args);

    if let Err(e) = cedar_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config)) {
        eprintln!("cedar: logging unavailable: {e}");
    }
    info!(
        "Config from {} | server {}:{} as '{}'",
        dirs.config_dir.display(),
        config.network.server_address,
        config.network.server_port,
        config.network.username
    );

    let credentials = Credentials::new(
        config.network.username.clone(),
        cli.args.password.clone().unwrap_or_default(),
    );
    let timeout = Duration::from_secs(u64::from(config.network.timeout_seconds));

    match cli.command {
        Command::Session { ticks, pan_x, pan_y } => {
            let world = open_world(&config.world)?;
            let mut session = Session::start(world, &config, &credentials)?.with_pan(pan_x, pan_y);
            session.run(ticks);
            session.settle(timeout)?;
            let summary = session.close(timeout);
            info!("Session summary: {summary}");
        }
        Command::Dedupe { area, ids } => {
            let area = parse_area(&area)?;
            let ids = parse_ids(&ids)?;
            let world = open_world(&config.world)?;

            let (tx, rx) = event_channel(config.cache.event_queue_capacity.max(1));
            let mut client =
                LocalSyncClient::spawn(world, link_config(&config), tx).map_err(AppError::Spawn)?;
            let info = client.connect(
                &config.network.server_address,
                config.network.server_port,
                &credentials,
            )?;
            let area = area.clamp_to(WorldBounds::new(info.width, info.height));
            let report = dedupe_statics(&mut client, &rx, area, &ids, timeout)?;
            info!(
                "Removed {} duplicate statics across {} cells",
                report.removed, report.cells
            );

            client.disconnect();
            drop(rx);
            if let Some(path) = &config.world.path
                && report.removed > 0
                && let Some(world) = client.shutdown()
            {
                world.save(path)?;
                info!("Saved deduplicated world to {}", path.display());
            }
        }
        Command::GenerateWorld { out } => {
            let world = MemoryWorld::generate(
                config.world.width_blocks,
                config.world.height_blocks,
                config.world.seed,
            );
            world.save(&out)?;
            info!(
                "Wrote {}x{} block world to {}",
                world.width(),
                world.height(),
                out.display()
            );
        }
    }
    Ok(())
}
