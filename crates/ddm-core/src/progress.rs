//! `ProgressState`: the per-download aggregate external observers poll, plus
//! the lifecycle event channel the caller supplies.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::Instant;

use crate::cancel::CancelScope;
use crate::error::DownloadError;

/// Messages the engine (via its caller) reports for a download's lifecycle.
/// The core itself only ever sends `Started` and `Error`; `Completed` is the
/// caller's responsibility to emit once it has observed `Ok` from the
/// orchestrator, per the engine/caller split described in the design.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started,
    Completed,
    Error(String),
}

pub type ProgressSender = Sender<LifecycleEvent>;

/// Shared, externally-observable state for one in-flight download.
pub struct ProgressState {
    pub total_size: i64,
    pub downloaded: AtomicI64,
    pub active_workers: AtomicI32,
    pub done: AtomicBool,
    pub paused: AtomicBool,
    error: Mutex<Option<DownloadError>>,
    /// Download-wide cancel handle; a caller (e.g. a Ctrl-C handler) cancels
    /// this to request pause or shutdown.
    pub cancel: CancelScope,
    pub start_time: Instant,
}

impl ProgressState {
    pub fn new(total_size: i64, cancel: CancelScope) -> Self {
        Self {
            total_size,
            downloaded: AtomicI64::new(0),
            active_workers: AtomicI32::new(0),
            done: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            error: Mutex::new(None),
            cancel,
            start_time: Instant::now(),
        }
    }

    pub fn downloaded(&self) -> i64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn set_error(&self, err: DownloadError) {
        *self.error.lock().unwrap() = Some(err);
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.lock().unwrap().as_ref().map(|e| e.to_string())
    }

    pub fn percent(&self) -> f64 {
        if self.total_size <= 0 {
            return 0.0;
        }
        (self.downloaded() as f64 / self.total_size as f64) * 100.0
    }
}
