//! Pool sizing and chunk-size derivation for a fresh download.

use crate::config::EngineConfig;
use crate::util::align_down;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Initial worker count from file size, clamped to the per-host cap.
pub fn initial_connections(file_size: u64, config: &EngineConfig) -> usize {
    let base = if file_size < 10 * MIB {
        1
    } else if file_size < 100 * MIB {
        4
    } else if file_size < GIB {
        6
    } else {
        32
    };
    base.min(config.max_connections_per_host)
}

/// `chunk = file_size / (n * tasks_per_worker)`, clamped into
/// `[min_chunk_size, max_chunk_size]`, falling back to `target_chunk_size`
/// when the size-derived value is zero, aligned down to 4 KiB (never to 0).
pub fn chunk_size(file_size: u64, connections: usize, config: &EngineConfig) -> u64 {
    const ALIGN: u64 = 4 * 1024;

    let divisor = (connections as u64 * config.tasks_per_worker as u64).max(1);
    let mut chunk = file_size / divisor;
    if chunk == 0 {
        chunk = config.target_chunk_size;
    }
    chunk = chunk.clamp(config.min_chunk_size, config.max_chunk_size);
    let aligned = align_down(chunk, ALIGN);
    if aligned == 0 {
        ALIGN
    } else {
        aligned
    }
}
