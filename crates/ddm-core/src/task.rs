//! `Task`: a half-open byte range within the target file, and the pure
//! partitioning function that turns a file size + chunk size into a `Vec<Task>`.

use serde::{Deserialize, Serialize};

/// A byte range `[offset, offset+length)` to fetch. Value type; once queued
/// it is owned by whoever currently holds it (the queue, a worker, or a
/// persisted `DownloadState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub offset: u64,
    pub length: u64,
}

impl Task {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end of the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Partitions `[0, file_size)` into tasks of at most `chunk` bytes each.
///
/// Returns an empty `Vec` if `file_size` is 0 or `chunk` is not positive.
/// The last task may be shorter than `chunk`; every other task is exactly
/// `chunk` bytes.
pub fn create_tasks(file_size: u64, chunk: i64) -> Vec<Task> {
    if file_size == 0 || chunk <= 0 {
        return Vec::new();
    }
    let chunk = chunk as u64;
    let mut tasks = Vec::with_capacity(((file_size + chunk - 1) / chunk) as usize);
    let mut offset = 0u64;
    while offset < file_size {
        let length = chunk.min(file_size - offset);
        tasks.push(Task::new(offset, length));
        offset += length;
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_partition() {
        let tasks = create_tasks(1_048_576, 262_144);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0], Task::new(0, 262_144));
        assert_eq!(tasks[1], Task::new(262_144, 262_144));
        assert_eq!(tasks[2], Task::new(524_288, 262_144));
        assert_eq!(tasks[3], Task::new(786_432, 262_144));
    }

    #[test]
    fn uneven_tail() {
        let tasks = create_tasks(1000, 300);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].length, 300);
        assert_eq!(tasks[1].length, 300);
        assert_eq!(tasks[2].length, 300);
        assert_eq!(tasks[3].length, 100);
    }

    #[test]
    fn non_positive_chunk_yields_nothing() {
        assert!(create_tasks(1000, 0).is_empty());
        assert!(create_tasks(1000, -5).is_empty());
    }

    #[test]
    fn zero_file_size_yields_nothing() {
        assert!(create_tasks(0, 1024).is_empty());
    }

    #[test]
    fn partition_covers_whole_file_disjointly() {
        let file_size = 1_234_567u64;
        let tasks = create_tasks(file_size, 99_999);
        let mut covered = 0u64;
        for t in &tasks {
            assert_eq!(t.offset, covered);
            assert!(t.length <= 99_999);
            covered += t.length;
        }
        assert_eq!(covered, file_size);
    }
}
