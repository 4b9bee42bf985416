//! Runtime configuration for the download engine.
//!
//! Loaded from `~/.config/ddm/config.toml` via `xdg` + `toml`. Every field
//! mirrors a tuning knob named in the engine's design: chunking bounds,
//! retry/backoff limits, and the thresholds the health monitor judges
//! workers against.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Engine-wide tuning knobs. `Default` matches the engine's built-in constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-host connection cap; also clamps the initial worker count.
    pub max_connections_per_host: usize,
    /// Lower bound on a task's byte length after a split or steal.
    pub min_chunk_size: u64,
    /// Upper bound on the chunk size used to partition a fresh download.
    pub max_chunk_size: u64,
    /// Preferred chunk size when the size-derived chunk would otherwise be zero.
    pub target_chunk_size: u64,
    /// Size hint for buffers handed to workers from the shared pool.
    pub worker_buffer_size: usize,
    /// Maximum attempts (including the first) per task before giving up and requeuing.
    pub max_task_retries: u32,
    /// Desired task count per worker when sizing the initial chunk.
    pub tasks_per_worker: usize,
    /// A worker below `slow_worker_threshold * mean_speed` is a steal/cancel candidate.
    pub slow_worker_threshold: f64,
    /// Absolute floor (bytes/sec): a worker above this speed is never judged "slow".
    pub slow_worker_floor_bps: u64,
    /// Seconds after a task starts before the health monitor will judge it.
    pub slow_worker_grace_period_secs: u64,
    /// Seconds of no activity before a worker's task is considered stalled.
    pub stall_timeout_secs: u64,
    /// Smoothing factor for the per-task EMA speed estimate.
    pub speed_ema_alpha: f64,
    /// User-Agent sent on probe and worker requests.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: 64,
            min_chunk_size: 2 * 1024 * 1024,
            max_chunk_size: 16 * 1024 * 1024,
            target_chunk_size: 8 * 1024 * 1024,
            worker_buffer_size: 512 * 1024,
            max_task_retries: 3,
            tasks_per_worker: 4,
            slow_worker_threshold: 0.50,
            slow_worker_floor_bps: 100 * 1024,
            slow_worker_grace_period_secs: 5,
            stall_timeout_secs: 5,
            speed_ema_alpha: 0.3,
            user_agent: "ddm/0.1".to_string(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ddm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: EngineConfig = toml::from_str(&data)?;
    Ok(cfg)
}
