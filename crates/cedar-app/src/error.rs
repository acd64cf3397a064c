//! Errors surfaced by the `cedar` binary.

use cedar_config::ConfigError;
use cedar_map::SyncError;
use cedar_sync::WorldError;

use crate::platform::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The sync worker thread could not be started.
    #[error("failed to start sync worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("invalid {what}: {reason}")]
    InvalidArgument { what: &'static str, reason: String },

    /// The peer stopped answering before the work finished.
    #[error("timed out after {seconds}s waiting for {waiting_for}")]
    Timeout { seconds: u64, waiting_for: String },
}
