//! A loopback sync peer for the cedar map cache.
//!
//! [`LocalSyncClient`] serves a [`MemoryWorld`] from a worker thread,
//! speaking the same request/event contract a networked peer would. It is
//! used by the `cedar` host binary and by end-to-end tests.

mod cache;
mod client;
mod world;

pub use cache::BlockCache;
pub use client::{LinkConfig, LocalSyncClient, RemoteEditor};
pub use world::{DEFAULT_LAND_ID, MemoryWorld, WorldError};
