//! `Balancer`: periodically reshapes work so idle workers get something to
//! do, first by splitting the largest queued task, falling back to
//! stealing the tail of the busiest active one.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::active_table::ActiveTaskTable;
use crate::cancel::CancelScope;
use crate::task_queue::{TaskQueue, ALIGN, MIN_CHUNK};

pub const TICK: Duration = Duration::from_millis(500);
pub const MAX_SPLITS: u32 = 50;

pub struct Balancer {
    queue: Arc<TaskQueue>,
    table: Arc<ActiveTaskTable>,
    scope: CancelScope,
    splits: AtomicU32,
}

impl Balancer {
    pub fn new(queue: Arc<TaskQueue>, table: Arc<ActiveTaskTable>, scope: CancelScope) -> Self {
        Self {
            queue,
            table,
            scope,
            splits: AtomicU32::new(0),
        }
    }

    /// Blocks the calling thread, ticking until the scope is cancelled or the
    /// queue closes.
    pub fn run(&self) {
        while !self.scope.is_cancelled() && !self.queue.is_closed() {
            std::thread::sleep(TICK);
            self.tick();
        }
    }

    /// One reshaping step. Exposed separately so tests can drive it without
    /// sleeping.
    pub fn tick(&self) {
        if self.splits.load(Ordering::Relaxed) >= MAX_SPLITS {
            return;
        }
        if self.queue.idle_workers() == 0 {
            return;
        }

        if self.queue.split_largest_if_needed() {
            self.splits.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if self.queue.is_empty() {
            if let Some(stolen) = self.table.steal_largest_remaining(MIN_CHUNK, ALIGN) {
                self.queue.push(stolen);
                self.splits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
