//! Command-line overrides for [`Config`].

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Options shared by every `cedar` subcommand.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Args, Debug, Default, Clone)]
pub struct CliArgs {
    /// Server address.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Account name.
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Account password. Never written to the config file.
    #[arg(long, global = true, env = "CEDAR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Screen width in pixels.
    #[arg(long, global = true)]
    pub width: Option<u32>,

    /// Screen height in pixels.
    #[arg(long, global = true)]
    pub height: Option<u32>,

    /// Zoom factor (1.0 = one tile per 31 pixels).
    #[arg(long, global = true)]
    pub zoom: Option<f32>,

    /// RON world file to serve.
    #[arg(long, global = true)]
    pub world: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(ref user) = args.user {
            self.network.username = user.clone();
        }
        if let Some(w) = args.width {
            self.view.screen_width = w;
        }
        if let Some(h) = args.height {
            self.view.screen_height = h;
        }
        if let Some(zoom) = args.zoom {
            self.view.zoom = zoom;
        }
        if let Some(ref path) = args.world {
            self.world.path = Some(path.clone());
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
