//! `HealthMonitor`: periodically scans active tasks for stalls and
//! abnormally slow workers, cancelling the worker's current task (never the
//! worker itself) so it requeues the remainder and moves on.

use std::sync::Arc;
use std::time::Duration;

use crate::active_table::ActiveTaskTable;
use crate::cancel::CancelScope;
use crate::config::EngineConfig;

/// Scan cadence. Not one of the runtime-configuration knobs, unlike the
/// thresholds below.
pub const TICK: Duration = Duration::from_secs(1);

pub struct HealthMonitor {
    table: Arc<ActiveTaskTable>,
    scope: CancelScope,
    grace: Duration,
    stall: Duration,
    slow_ratio: f64,
    slow_floor_bps: f64,
}

impl HealthMonitor {
    pub fn new(table: Arc<ActiveTaskTable>, scope: CancelScope, config: &EngineConfig) -> Self {
        Self {
            table,
            scope,
            grace: Duration::from_secs(config.slow_worker_grace_period_secs),
            stall: Duration::from_secs(config.stall_timeout_secs),
            slow_ratio: config.slow_worker_threshold,
            slow_floor_bps: config.slow_worker_floor_bps as f64,
        }
    }

    pub fn run(&self) {
        while !self.scope.is_cancelled() {
            std::thread::sleep(TICK);
            self.tick();
        }
    }

    /// One scan. Exposed separately so tests can drive it deterministically.
    pub fn tick(&self) {
        let snapshot = self.table.snapshot();

        let speeds: Vec<f64> = snapshot
            .iter()
            .map(|(_, at)| at.speed_bps())
            .filter(|s| *s > 0.0)
            .collect();
        let mean = if speeds.is_empty() {
            0.0
        } else {
            speeds.iter().sum::<f64>() / speeds.len() as f64
        };

        for (_, active) in &snapshot {
            if active.start_time.elapsed() < self.grace {
                continue;
            }

            if active.last_activity_age() > self.stall {
                active.cancel.cancel();
                continue;
            }

            let speed = active.speed_bps();
            if mean > 0.0 && speed > 0.0 && speed < self.slow_ratio * mean && speed < self.slow_floor_bps {
                active.cancel.cancel();
            }
        }
    }
}
