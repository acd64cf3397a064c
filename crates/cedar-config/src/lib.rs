//! Configuration for the Cedar map client.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line. Unknown and missing fields are tolerated so older and newer
//! files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, CacheConfig, Config, DebugConfig, NetworkConfig, ViewConfig, WorldConfig};
pub use error::ConfigError;
