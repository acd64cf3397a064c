//! Removes stacked duplicate statics from an area of the map.
//!
//! For every coordinate in the area, statics whose graphic is in the id list
//! are collected in draw order; the first is kept and the rest are removed
//! through the peer, so other clients see the removals too.

use std::time::{Duration, Instant};

use cedar_map::{
    BlockAddress, EventReceiver, FlatDrawOrder, MapEditor, StaticTile, SyncClient, SyncError,
    SyncEvent, TileRect, sort_statics,
};
use rustc_hash::FxHashSet;

use crate::error::AppError;

/// What a dedupe pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DedupeReport {
    pub blocks: usize,
    pub cells: usize,
    pub removed: usize,
}

/// Parses `x1,y1,x2,y2`. Both corners are included.
pub fn parse_area(text: &str) -> Result<TileRect, AppError> {
    let invalid = |reason: String| AppError::InvalidArgument { what: "area", reason };
    let values = text
        .split(',')
        .map(|part| part.trim().parse::<u16>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(format!("{text:?}: {e}")))?;
    match values[..] {
        [x1, y1, x2, y2] => Ok(TileRect::from_corners(x1, y1, x2, y2)),
        _ => Err(invalid(format!("{text:?}: expected x1,y1,x2,y2"))),
    }
}

/// Parses a comma-separated list of graphic ids, hex with `0x` or decimal.
pub fn parse_ids(text: &str) -> Result<Vec<u16>, AppError> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let parsed = match part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
                Some(hex) => u16::from_str_radix(hex, 16),
                None => part.parse(),
            };
            parsed.map_err(|e| AppError::InvalidArgument {
                what: "graphic id",
                reason: format!("{part:?}: {e}"),
            })
        })
        .collect()
}

/// Loads every block under `area`, waits for them to arrive, then removes
/// all but the first matching static on each coordinate. Returns once the
/// peer has announced every removal.
///
/// `area` must already be clamped to the world.
pub fn dedupe_statics<C>(
    client: &mut C,
    events: &EventReceiver,
    area: TileRect,
    ids: &[u16],
    timeout: Duration,
) -> Result<DedupeReport, AppError>
where
    C: SyncClient + MapEditor,
{
    let blocks: Vec<BlockAddress> = area.blocks().iter().collect();
    let mut report = DedupeReport {
        blocks: blocks.len(),
        ..DedupeReport::default()
    };
    if blocks.is_empty() || ids.is_empty() {
        return Ok(report);
    }

    client.resize_cache(blocks.len());
    client.load_blocks(&blocks);
    wait_for_blocks(events, &blocks, timeout)?;

    let mut removed = Vec::new();
    for coord in area.iter() {
        report.cells += 1;
        let mut cell = client.static_tiles(coord.x, coord.y);
        sort_statics(&mut cell, &FlatDrawOrder);
        let duplicates = cell.into_iter().filter(|s| ids.contains(&s.id)).skip(1);
        for tile in duplicates {
            client.remove_static(tile)?;
            removed.push(tile);
        }
    }
    report.removed = removed.len();
    wait_for_removals(events, removed, timeout)?;
    tracing::info!(
        "Dedupe scanned {} cells in {} blocks, removed {} statics",
        report.cells,
        report.blocks,
        report.removed
    );
    Ok(report)
}

fn wait_for_blocks(
    events: &EventReceiver,
    blocks: &[BlockAddress],
    timeout: Duration,
) -> Result<(), AppError> {
    let mut missing: FxHashSet<BlockAddress> = blocks.iter().copied().collect();
    let deadline = Instant::now() + timeout;
    while !missing.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Some(SyncEvent::BlockLoaded(block)) => {
                missing.remove(&block.address);
            }
            Some(SyncEvent::BlockUnloaded { x, y }) => {
                tracing::warn!("block ({}, {}) unloaded before dedupe finished", x, y);
            }
            Some(SyncEvent::Disconnected) => return Err(SyncError::NotConnected.into()),
            Some(_) => {}
            None => {
                return Err(AppError::Timeout {
                    seconds: timeout.as_secs(),
                    waiting_for: format!("{} of {} blocks", missing.len(), blocks.len()),
                });
            }
        }
    }
    Ok(())
}

fn wait_for_removals(
    events: &EventReceiver,
    mut outstanding: Vec<StaticTile>,
    timeout: Duration,
) -> Result<(), AppError> {
    let deadline = Instant::now() + timeout;
    while !outstanding.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Some(SyncEvent::StaticRemoved(tile)) => {
                if let Some(pos) = outstanding.iter().position(|t| *t == tile) {
                    outstanding.swap_remove(pos);
                }
            }
            Some(SyncEvent::Disconnected) => return Err(SyncError::NotConnected.into()),
            Some(_) => {}
            None => {
                return Err(AppError::Timeout {
                    seconds: timeout.as_secs(),
                    waiting_for: format!("{} removals", outstanding.len()),
                });
            }
        }
    }
    Ok(())
}
