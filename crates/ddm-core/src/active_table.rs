//! `ActiveTaskTable`: registry of currently-executing tasks keyed by worker id.
//!
//! Insert/remove/iterate are guarded by a single mutex; the `ActiveTask`
//! fields themselves are read lock-free by callers that already hold an
//! `Arc<ActiveTask>` (the `HealthMonitor`'s speed/stall scan does this).

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::active_task::ActiveTask;
use crate::task::Task;
use crate::util::align_down;

pub type WorkerId = usize;

#[derive(Default)]
pub struct ActiveTaskTable {
    inner: Mutex<HashMap<WorkerId, Arc<ActiveTask>>>,
}

impl ActiveTaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, worker_id: WorkerId, task: Arc<ActiveTask>) {
        self.inner.lock().unwrap().insert(worker_id, task);
    }

    pub fn remove(&self, worker_id: WorkerId) -> Option<Arc<ActiveTask>> {
        self.inner.lock().unwrap().remove(&worker_id)
    }

    /// Snapshot of all currently-registered active tasks, for the health
    /// monitor's scan and the pause handler's "synthesize remaining work" step.
    pub fn snapshot(&self) -> Vec<(WorkerId, Arc<ActiveTask>)> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .map(|(id, at)| (*id, at.clone()))
            .collect()
    }

    /// Find the active task with the most remaining bytes (`stop_at -
    /// current_offset`) above `min_chunk`, shrink its `stop_at` by half
    /// (aligned down), and return a `Task` covering the stolen tail.
    ///
    /// Returns `None` if no task qualifies, the split would be too small, or
    /// the victim finished its (now shrunk) range before the steal landed.
    pub fn steal_largest_remaining(&self, min_chunk: u64, align: u64) -> Option<Task> {
        let inner = self.inner.lock().unwrap();

        let mut victim: Option<(WorkerId, Arc<ActiveTask>, u64)> = None;
        for (id, at) in inner.iter() {
            let cur = at.current_offset.load(Ordering::Acquire);
            let stop = at.stop_at.load(Ordering::Acquire);
            let remaining = stop.saturating_sub(cur);
            if remaining <= min_chunk {
                continue;
            }
            let better = match &victim {
                None => true,
                Some((vid, _, vrem)) => remaining > *vrem || (remaining == *vrem && *id < *vid),
            };
            if better {
                victim = Some((*id, at.clone(), remaining));
            }
        }
        drop(inner);

        let (_, at, remaining) = victim?;
        let split = align_down(remaining / 2, align);
        if split < min_chunk {
            return None;
        }

        let cur = at.current_offset.load(Ordering::Acquire);
        let original_end = at.original_end();
        let new_stop_at = cur + split;
        at.stop_at.store(new_stop_at, Ordering::Release);

        let cur_after = at.current_offset.load(Ordering::Acquire);
        let stolen_start = new_stop_at.max(cur_after);
        if stolen_start >= original_end {
            return None;
        }
        Some(Task::new(stolen_start, original_end - stolen_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelScope;

    #[test]
    fn steal_picks_largest_remaining_above_threshold() {
        let table = ActiveTaskTable::new();
        let small = Arc::new(ActiveTask::new(Task::new(0, 1_000_000), CancelScope::root()));
        let big = Arc::new(ActiveTask::new(Task::new(10_000_000, 8_000_000), CancelScope::root()));
        table.insert(0, small);
        table.insert(1, big.clone());

        let stolen = table
            .steal_largest_remaining(2 * 1024 * 1024, 4096)
            .expect("should steal from the larger task");
        assert_eq!(stolen.offset, big.current_offset.load(Ordering::Relaxed));
        assert!(big.stop_at.load(Ordering::Relaxed) < big.original_end());
    }

    #[test]
    fn steal_refuses_when_everything_is_small() {
        let table = ActiveTaskTable::new();
        let at = Arc::new(ActiveTask::new(Task::new(0, 1024), CancelScope::root()));
        table.insert(0, at);
        assert!(table.steal_largest_remaining(2 * 1024 * 1024, 4096).is_none());
    }

    #[test]
    fn steal_tie_break_prefers_smallest_worker_id() {
        let table = ActiveTaskTable::new();
        let a = Arc::new(ActiveTask::new(Task::new(0, 8_000_000), CancelScope::root()));
        let b = Arc::new(ActiveTask::new(Task::new(100_000_000, 8_000_000), CancelScope::root()));
        table.insert(5, b);
        table.insert(2, a.clone());

        let stolen = table.steal_largest_remaining(2 * 1024 * 1024, 4096).unwrap();
        assert_eq!(stolen.offset, a.current_offset.load(Ordering::Relaxed));
    }

    #[test]
    fn steal_union_is_preserved() {
        let table = ActiveTaskTable::new();
        let at = Arc::new(ActiveTask::new(Task::new(0, 8_000_000), CancelScope::root()));
        table.insert(0, at.clone());

        let stolen = table.steal_largest_remaining(2 * 1024 * 1024, 4096).unwrap();
        let new_stop = at.stop_at.load(Ordering::Relaxed);
        assert_eq!(stolen.offset, new_stop);
        assert_eq!(stolen.end(), at.original_end());
    }
}
