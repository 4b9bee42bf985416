//! `TaskQueue`: a mutex-guarded vector + condvar + atomic idle-worker count.
//!
//! A plain channel can't do what the balancer needs: mutate the largest
//! queued item in place (split), drain everything remaining (pause), and
//! expose how many workers are currently blocked waiting for work. So this
//! models the queue directly instead of wrapping `std::sync::mpsc`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::task::Task;
use crate::util::align_down;

/// Minimum length a task may have after a split or a steal.
pub const MIN_CHUNK: u64 = 2 * 1024 * 1024;
/// Alignment applied to split/steal boundaries.
pub const ALIGN: u64 = 4 * 1024;

struct Inner {
    items: VecDeque<Task>,
    done: bool,
}

/// Result of `TaskQueue::pop`.
pub enum Popped {
    Task(Task),
    Closed,
}

pub struct TaskQueue {
    inner: Mutex<Inner>,
    cv: Condvar,
    idle_workers: AtomicUsize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            idle_workers: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, task: Task) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_back(task);
        drop(inner);
        self.cv.notify_one();
    }

    pub fn push_many(&self, tasks: impl IntoIterator<Item = Task>) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.extend(tasks);
        drop(inner);
        self.cv.notify_all();
    }

    /// Block until a task is available or the queue is closed. Only reports
    /// `Closed` once the queue is both empty and marked done.
    pub fn pop(&self) -> Popped {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(task) = inner.items.pop_front() {
                return Popped::Task(task);
            }
            if inner.done {
                return Popped::Closed;
            }
            self.idle_workers.fetch_add(1, Ordering::SeqCst);
            inner = self.cv.wait(inner).unwrap();
            self.idle_workers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.done = true;
        drop(inner);
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().done
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn idle_workers(&self) -> usize {
        self.idle_workers.load(Ordering::SeqCst)
    }

    /// Return every queued task and empty the queue. Used on pause, so the
    /// remaining ranges can be folded into the persisted state.
    pub fn drain_remaining(&self) -> Vec<Task> {
        let mut inner = self.inner.lock().unwrap();
        inner.items.drain(..).collect()
    }

    /// Find the largest queued task whose length exceeds `2*MIN_CHUNK`, split
    /// it in half (aligned down), replace it in place with the right (later)
    /// half, and append the left (earlier) half. Refuses if either resulting
    /// half would be shorter than `MIN_CHUNK`.
    pub fn split_largest_if_needed(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();

        let mut best_idx = None;
        let mut best_len = 0u64;
        for (i, t) in inner.items.iter().enumerate() {
            if t.length > best_len {
                best_len = t.length;
                best_idx = Some(i);
            }
        }
        let Some(idx) = best_idx else {
            return false;
        };
        if best_len <= 2 * MIN_CHUNK {
            return false;
        }

        let half = align_down(best_len / 2, ALIGN);
        let other = best_len - half;
        if half < MIN_CHUNK || other < MIN_CHUNK {
            return false;
        }

        let orig = inner.items[idx];
        let right = Task::new(orig.offset + half, orig.length - half);
        let left = Task::new(orig.offset, half);
        inner.items[idx] = right;
        inner.items.push_back(left);

        drop(inner);
        self.cv.notify_all();
        true
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_pop_roundtrip() {
        let q = TaskQueue::new();
        q.push(Task::new(0, 10));
        match q.pop() {
            Popped::Task(t) => assert_eq!(t, Task::new(0, 10)),
            Popped::Closed => panic!("expected a task"),
        }
    }

    #[test]
    fn close_wakes_blocked_pop() {
        let q = Arc::new(TaskQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || matches!(q2.pop(), Popped::Closed));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.idle_workers(), 1);
        q.close();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn drain_remaining_empties_queue() {
        let q = TaskQueue::new();
        q.push_many([Task::new(0, 10), Task::new(10, 10)]);
        assert_eq!(q.len(), 2);
        let drained = q.drain_remaining();
        assert_eq!(drained.len(), 2);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn split_largest_preserves_union() {
        let q = TaskQueue::new();
        let big = Task::new(0, 10 * 1024 * 1024);
        q.push(big);
        assert!(q.split_largest_if_needed());
        let drained = q.drain_remaining();
        assert_eq!(drained.len(), 2);
        let mut sorted = drained;
        sorted.sort_by_key(|t| t.offset);
        assert_eq!(sorted[0].offset, big.offset);
        assert_eq!(sorted[1].end(), big.end());
        assert_eq!(sorted[0].end(), sorted[1].offset);
        for t in &sorted {
            assert!(t.length >= MIN_CHUNK);
        }
    }

    #[test]
    fn split_refuses_when_too_small() {
        let q = TaskQueue::new();
        q.push(Task::new(0, 3 * 1024 * 1024));
        assert!(!q.split_largest_if_needed());
    }

    #[test]
    fn split_picks_largest_with_array_order_tiebreak() {
        let q = TaskQueue::new();
        let a = Task::new(0, 10 * 1024 * 1024);
        let b = Task::new(100, 10 * 1024 * 1024);
        q.push_many([a, b]);
        assert!(q.split_largest_if_needed());
        let drained = q.drain_remaining();
        // `a` (first equal-length candidate) should have been the one split:
        // its slot now holds the right half, and the left half was appended.
        assert_eq!(drained[0].offset, a.offset + drained[2].length);
        assert_eq!(drained[1], b);
    }

    #[test]
    fn idle_workers_tracks_blocked_pops() {
        let q = Arc::new(TaskQueue::new());
        assert_eq!(q.idle_workers(), 0);
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.idle_workers(), 1);
        q.push(Task::new(0, 1));
        let _ = handle.join();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.idle_workers(), 0);
    }
}
