//! Configuration sections, their defaults, and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where the map server lives and who we log in as.
    pub network: NetworkConfig,
    /// Screen, zoom and the margins around the visible range.
    pub view: ViewConfig,
    pub cache: CacheConfig,
    /// The in-process world served when no server is available.
    pub world: WorldConfig,
    pub debug: DebugConfig,
}

/// Server connection settings. The password is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub server_address: String,
    pub server_port: u16,
    pub username: String,
    /// Seconds to wait for the server to answer a login.
    pub timeout_seconds: u32,
}

/// View range settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// Screen width in pixels.
    pub screen_width: u32,
    /// Screen height in pixels.
    pub screen_height: u32,
    pub zoom: f32,
    /// Extra tiles kept around the visible area so tall statics and
    /// elevated land near the edge still draw.
    pub tile_margin: u32,
    /// Extra blocks requested around the view range.
    pub block_margin: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of the queue between the sync worker and the main thread.
    /// The worker blocks when it is full.
    pub event_queue_capacity: usize,
}

/// Local world settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// World width in 8x8 blocks.
    pub width_blocks: u16,
    /// World height in 8x8 blocks.
    pub height_blocks: u16,
    /// Seed for the generated world when `path` is unset.
    pub seed: u64,
    /// RON world file to serve instead of a generated one.
    pub path: Option<PathBuf>,
    /// Artificial delay before each block batch is delivered.
    pub load_latency_ms: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 2597,
            username: "admin".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            screen_width: 1280,
            screen_height: 720,
            zoom: 1.0,
            tile_margin: 8,
            block_margin: 1,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 4096,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width_blocks: 64,
            height_blocks: 64,
            seed: 0x5EED,
            path: None,
            load_latency_ms: 0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads `config.ron` from `config_dir`, writing the defaults there
    /// first if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Saves the config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::WriteError {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::WriteError {
            path: config_path.clone(),
            source,
        })?;
        log::debug!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Re-reads the file. Returns `Some` with the new settings only when
    /// they differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_serialize() {
        let ron_str =
            ron::ser::to_string_pretty(&Config::default(), ron::ser::PrettyConfig::new()).unwrap();
        assert!(ron_str.contains("server_port: 2597"));
        assert!(ron_str.contains("event_queue_capacity: 4096"));
        assert!(ron_str.contains("tile_margin: 8"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = ron::from_str("(network: (server_port: 9000))").unwrap();
        assert_eq!(config.network.server_port, 9000);
        assert_eq!(config.network.username, "admin");
        assert_eq!(config.view, ViewConfig::default());
        assert_eq!(config.world.seed, 0x5EED);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let result: Result<Config, _> = ron::from_str("(render_distance: 12, view: (fov: 70))");
        assert!(result.is_ok());
    }

    #[test]
    fn test_world_path_round_trips() {
        let mut config = Config::default();
        config.world.path = Some(PathBuf::from("maps/britain.ron"));
        let text = ron::to_string(&config).unwrap();
        let back: Config = ron::from_str(&text).unwrap();
        assert_eq!(back.world.path, Some(PathBuf::from("maps/britain.ron")));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.network.server_address = "10.0.0.7".to_string();
        config.view.zoom = 0.5;
        config.world.width_blocks = 896;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());

        let mut modified = config.clone();
        modified.view.block_margin = 3;
        modified.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap();
        assert_eq!(reloaded.map(|c| c.view.block_margin), Some(3));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not ron").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}
