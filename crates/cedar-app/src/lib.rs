//! Headless host for the cedar map cache.
//!
//! Drives a [`CacheCoordinator`](cedar_map::CacheCoordinator) from a
//! fixed-rate loop against the loopback peer, and hosts the maintenance
//! tools behind the `cedar` binary.

pub mod dedupe;
pub mod error;
pub mod platform;
pub mod session;
pub mod tick_loop;

pub use error::AppError;
