//! `Orchestrator`: sizes the worker pool, partitions the file (or restores
//! tasks from a saved state), spawns the engine's threads, and drives the
//! three shutdown paths (success, pause, error).

mod sizing;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::active_table::ActiveTaskTable;
use crate::balancer::Balancer;
use crate::cancel::CancelScope;
use crate::config::EngineConfig;
use crate::error::DownloadError;
use crate::health::HealthMonitor;
use crate::progress::ProgressState;
use crate::state::{DownloadState, DownloadStatus, LoadResult, StateStore};
use crate::storage::{self, OutputFile, OutputFileBuilder};
use crate::task::{self, Task};
use crate::task_queue::TaskQueue;
use crate::util::now_unix_secs;
use crate::worker::{self, WorkerContext};

/// Everything the orchestrator needs to run one download end to end.
pub struct DownloadRequest {
    pub url: String,
    pub dest_path: PathBuf,
    pub filename: String,
    pub file_size: u64,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed,
    Paused,
}

/// Drives `req` to completion or pause.
///
/// `progress.cancel` is the download-wide scope workers and background
/// threads check; the caller is expected to have constructed it as
/// `parent_scope.child()` before calling. `parent_scope` itself is accepted
/// (per the engine's input contract) but not re-derived from here, so the
/// whole run checks exactly one scope object rather than two that could
/// drift apart.
///
/// `store` is the state-persistence collaborator, passed in as a small
/// context object rather than a hidden global: the CLI points it at the
/// XDG state home, tests point it at a temp directory.
pub fn download(
    req: DownloadRequest,
    config: EngineConfig,
    progress: Arc<ProgressState>,
    parent_scope: CancelScope,
    store: &StateStore,
) -> Result<DownloadOutcome, DownloadError> {
    let _ = &parent_scope;
    let download_scope = progress.cancel.clone();
    let dest_path_str = req.dest_path.to_string_lossy().to_string();
    let temp_path = storage::temp_path(&req.dest_path);

    let (output, tasks, created_at) = open_output_and_tasks(&req, &temp_path, &progress, &config, store)?;

    let connections = sizing::initial_connections(req.file_size, &config).max(1);
    let queue = Arc::new(TaskQueue::new());
    queue.push_many(tasks);
    let table = Arc::new(ActiveTaskTable::new());

    let worker_handles = spawn_workers(
        connections,
        &req,
        &queue,
        &table,
        &progress,
        &output,
        &config,
        &download_scope,
    );

    let balancer = Arc::new(Balancer::new(queue.clone(), table.clone(), download_scope.clone()));
    let balancer_handle = {
        let b = balancer.clone();
        thread::spawn(move || b.run())
    };

    let health = Arc::new(HealthMonitor::new(table.clone(), download_scope.clone(), &config));
    let health_handle = {
        let h = health.clone();
        thread::spawn(move || h.run())
    };

    let watcher_handle = spawn_completion_watcher(queue.clone(), connections, download_scope.clone());

    let mut first_error: Option<DownloadError> = None;
    for h in worker_handles {
        match h.join().expect("worker thread panicked") {
            Ok(()) | Err(DownloadError::Canceled) => {}
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    // Capture whether the caller requested a shutdown before we cancel the
    // scope ourselves below purely to stop the balancer/health-monitor loops.
    let was_cancelled = download_scope.is_cancelled();

    queue.close();
    download_scope.cancel();
    let _ = balancer_handle.join();
    let _ = health_handle.join();
    let _ = watcher_handle.join();

    if was_cancelled && progress.paused.load(Ordering::SeqCst) {
        return do_pause(&req, &dest_path_str, &queue, &table, &progress, created_at, store);
    }
    if let Some(err) = first_error {
        progress.set_error(clone_error(&err));
        let _ = store.record_status(
            &req.url,
            &dest_path_str,
            &req.filename,
            progress.total_size,
            DownloadStatus::Error,
        );
        return Err(err);
    }
    if was_cancelled {
        return Err(DownloadError::Canceled);
    }

    finalize_success(&req, &dest_path_str, output, &progress, store)
}

fn open_output_and_tasks(
    req: &DownloadRequest,
    temp_path: &std::path::Path,
    progress: &ProgressState,
    config: &EngineConfig,
    store: &StateStore,
) -> Result<(OutputFile, Vec<Task>, i64), DownloadError> {
    let dest_path_str = req.dest_path.to_string_lossy().to_string();
    match store.load(&req.url, &dest_path_str).map_err(|e| DownloadError::StateCorrupt(e.to_string()))? {
        LoadResult::Found(saved) if !saved.tasks.is_empty() => {
            let output = OutputFile::open_existing(temp_path).map_err(to_io)?;
            progress.downloaded.store(saved.downloaded, Ordering::Relaxed);
            Ok((output, saved.tasks, saved.created_at))
        }
        LoadResult::Corrupt(msg) => {
            tracing::warn!(error = %msg, "saved state is corrupt, starting fresh");
            fresh_output_and_tasks(req, temp_path, config)
        }
        _ => fresh_output_and_tasks(req, temp_path, config),
    }
}

fn fresh_output_and_tasks(
    req: &DownloadRequest,
    temp_path: &std::path::Path,
    config: &EngineConfig,
) -> Result<(OutputFile, Vec<Task>, i64), DownloadError> {
    let mut builder = OutputFileBuilder::create(temp_path).map_err(to_io)?;
    builder.preallocate(req.file_size).map_err(to_io)?;
    let output = builder.build();
    let connections = sizing::initial_connections(req.file_size, config);
    let chunk = sizing::chunk_size(req.file_size, connections, config);
    let tasks = task::create_tasks(req.file_size, chunk as i64);
    Ok((output, tasks, now_unix_secs()))
}

#[allow(clippy::too_many_arguments)]
fn spawn_workers(
    connections: usize,
    req: &DownloadRequest,
    queue: &Arc<TaskQueue>,
    table: &Arc<ActiveTaskTable>,
    progress: &Arc<ProgressState>,
    output: &OutputFile,
    config: &EngineConfig,
    download_scope: &CancelScope,
) -> Vec<thread::JoinHandle<Result<(), DownloadError>>> {
    (0..connections)
        .map(|id| {
            let ctx = WorkerContext {
                id,
                url: req.url.clone(),
                headers: req.headers.clone(),
                queue: queue.clone(),
                table: table.clone(),
                progress: progress.clone(),
                output: output.clone(),
                config: config.clone(),
                download_scope: download_scope.clone(),
            };
            thread::spawn(move || worker::run(ctx))
        })
        .collect()
}

/// Closes the queue once every worker is idle with nothing left to pop, or
/// as soon as the download scope is cancelled. The cancel check matters even
/// when some workers are still busy: a worker parked in `TaskQueue::pop`
/// never observes a cancelled scope on its own (it only wakes on
/// push/close), so without this it would block forever while its busy
/// siblings abort and return `Canceled`.
fn spawn_completion_watcher(
    queue: Arc<TaskQueue>,
    connections: usize,
    scope: CancelScope,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_millis(500));
        if queue.is_closed() {
            return;
        }
        if scope.is_cancelled() {
            queue.close();
            return;
        }
        if queue.is_empty() && queue.idle_workers() == connections {
            queue.close();
            return;
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn do_pause(
    req: &DownloadRequest,
    dest_path_str: &str,
    queue: &TaskQueue,
    table: &ActiveTaskTable,
    progress: &ProgressState,
    created_at: i64,
    store: &StateStore,
) -> Result<DownloadOutcome, DownloadError> {
    let mut remaining = queue.drain_remaining();
    for (_, active) in table.snapshot() {
        let current = active.current_offset.load(Ordering::Acquire);
        let stop_at = active.stop_at.load(Ordering::Acquire);
        if current < stop_at {
            remaining.push(Task::new(current, stop_at - current));
        }
    }

    let saved = DownloadState {
        state_hash: String::new(),
        url_hash: String::new(),
        url: req.url.clone(),
        dest_path: dest_path_str.to_string(),
        total_size: progress.total_size,
        downloaded: progress.downloaded(),
        filename: req.filename.clone(),
        tasks: remaining,
        created_at,
        paused_at: 0,
    };
    store.save(&req.url, dest_path_str, saved).map_err(|e| DownloadError::StateCorrupt(e.to_string()))?;
    Ok(DownloadOutcome::Paused)
}

fn finalize_success(
    req: &DownloadRequest,
    dest_path_str: &str,
    output: OutputFile,
    progress: &ProgressState,
    store: &StateStore,
) -> Result<DownloadOutcome, DownloadError> {
    output.sync().map_err(to_io)?;
    output.finalize(&req.dest_path).map_err(to_io)?;
    let _ = store.delete(&req.url, dest_path_str);
    let _ = store.record_status(
        &req.url,
        dest_path_str,
        &req.filename,
        progress.total_size,
        DownloadStatus::Completed,
    );
    progress.done.store(true, Ordering::SeqCst);
    Ok(DownloadOutcome::Completed)
}

fn to_io(e: anyhow::Error) -> DownloadError {
    match e.downcast::<std::io::Error>() {
        Ok(io_err) => DownloadError::Io(io_err),
        Err(e) => DownloadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
    }
}

fn clone_error(e: &DownloadError) -> DownloadError {
    match e {
        DownloadError::InvalidArgument(s) => DownloadError::InvalidArgument(s.clone()),
        DownloadError::Network(s) => DownloadError::Network(s.clone()),
        DownloadError::HttpStatus(c) => DownloadError::HttpStatus(*c),
        DownloadError::Io(io) => DownloadError::Io(std::io::Error::new(io.kind(), io.to_string())),
        DownloadError::Canceled => DownloadError::Canceled,
        DownloadError::Paused => DownloadError::Paused,
        DownloadError::StateCorrupt(s) => DownloadError::StateCorrupt(s.clone()),
    }
}
