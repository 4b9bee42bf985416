//! `ActiveTask`: a `Task` plus the runtime fields a worker updates while it
//! is in flight, read lock-free by the `Balancer` and `HealthMonitor`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cancel::CancelScope;
use crate::task::Task;
use crate::util::now_unix_nanos;

/// Speed fields that need a short critical section together: the EMA value
/// and when its current sliding window started. `window_bytes` itself stays
/// a lock-free atomic so the worker's hot path never blocks on this mutex.
struct SpeedState {
    speed_bps: f64,
    window_start: Instant,
}

/// A task currently being executed by a worker.
///
/// Invariant: `task.offset <= current_offset <= stop_at <= task.offset + task.length`
/// holds at every observation point.
pub struct ActiveTask {
    task: Task,
    pub current_offset: AtomicU64,
    pub stop_at: AtomicU64,
    pub last_activity_nanos: AtomicI64,
    pub window_bytes: AtomicU64,
    pub start_time: Instant,
    speed: Mutex<SpeedState>,
    /// Per-task cancel handle; the health monitor calls `.cancel()` on this
    /// to abort exactly this task's in-flight HTTP call.
    pub cancel: CancelScope,
}

impl ActiveTask {
    pub fn new(task: Task, cancel: CancelScope) -> Self {
        let now = Instant::now();
        Self {
            task,
            current_offset: AtomicU64::new(task.offset),
            stop_at: AtomicU64::new(task.end()),
            last_activity_nanos: AtomicI64::new(now_unix_nanos()),
            window_bytes: AtomicU64::new(0),
            start_time: now,
            speed: Mutex::new(SpeedState {
                speed_bps: 0.0,
                window_start: now,
            }),
            cancel,
        }
    }

    /// The original, immutable end of the task's byte range (before any
    /// steal shrank `stop_at`). Used to compute what's left to requeue.
    pub fn original_end(&self) -> u64 {
        self.task.end()
    }

    pub fn original_offset(&self) -> u64 {
        self.task.offset
    }

    pub fn speed_bps(&self) -> f64 {
        self.speed.lock().unwrap().speed_bps
    }

    /// Roll the sliding window into the EMA if at least `min_window` of wall
    /// time has elapsed since the window started. No-op otherwise.
    pub fn maybe_update_speed(&self, min_window: Duration, alpha: f64) {
        let mut state = self.speed.lock().unwrap();
        let elapsed = state.window_start.elapsed();
        if elapsed < min_window {
            return;
        }
        let bytes = self.window_bytes.swap(0, Ordering::Relaxed);
        let recent = bytes as f64 / elapsed.as_secs_f64();
        state.speed_bps = if state.speed_bps == 0.0 {
            recent
        } else {
            (1.0 - alpha) * state.speed_bps + alpha * recent
        };
        state.window_start = Instant::now();
    }

    pub fn last_activity_age(&self) -> Duration {
        let last = self.last_activity_nanos.load(Ordering::Relaxed);
        let now = now_unix_nanos();
        Duration::from_nanos(now.saturating_sub(last).max(0) as u64)
    }
}
