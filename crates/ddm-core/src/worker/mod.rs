//! `Worker`: pops tasks from the queue and drives them to completion,
//! retrying and requeuing as directed by the health monitor or ordinary
//! transient failures.

mod attempt;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::active_table::{ActiveTaskTable, WorkerId};
use crate::active_task::ActiveTask;
use crate::cancel::CancelScope;
use crate::config::EngineConfig;
use crate::error::DownloadError;
use crate::progress::ProgressState;
use crate::storage::OutputFile;
use crate::task::Task;
use crate::task_queue::{Popped, TaskQueue};

pub use attempt::AttemptOutcome;

/// Everything a worker needs borrowed for its whole lifetime.
pub struct WorkerContext {
    pub id: WorkerId,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub queue: Arc<TaskQueue>,
    pub table: Arc<ActiveTaskTable>,
    pub progress: Arc<ProgressState>,
    pub output: OutputFile,
    pub config: EngineConfig,
    pub download_scope: CancelScope,
}

/// Runs the worker loop until the queue closes or a non-retryable error
/// (other than a clean pause/cancel) occurs.
pub fn run(ctx: WorkerContext) -> Result<(), DownloadError> {
    ctx.progress.active_workers.fetch_add(1, Ordering::SeqCst);
    let result = run_inner(&ctx);
    ctx.progress.active_workers.fetch_sub(1, Ordering::SeqCst);
    result
}

fn run_inner(ctx: &WorkerContext) -> Result<(), DownloadError> {
    loop {
        let mut task = match ctx.queue.pop() {
            Popped::Task(t) => t,
            Popped::Closed => return Ok(()),
        };

        match run_task(ctx, task) {
            TaskOutcome::Done => continue,
            TaskOutcome::DownloadCancelled => return Err(DownloadError::Canceled),
            TaskOutcome::Requeued(next) => {
                task = next;
                ctx.queue.push(task);
                continue;
            }
            TaskOutcome::ExhaustedWithError(remaining, err) => {
                tracing::warn!(worker = ctx.id, error = %err, "task retries exhausted, requeuing");
                ctx.queue.push(remaining);
                continue;
            }
        }
    }
}

enum TaskOutcome {
    Done,
    DownloadCancelled,
    /// Health monitor killed this task; requeue the remainder without
    /// consuming a retry attempt.
    Requeued(Task),
    ExhaustedWithError(Task, DownloadError),
}

fn run_task(ctx: &WorkerContext, initial: Task) -> TaskOutcome {
    let mut task = initial;
    let mut attempt_num = 0u32;

    loop {
        attempt_num += 1;
        if attempt_num > 1 {
            let backoff = Duration::from_millis(200) * 2u32.pow(attempt_num - 1);
            thread::sleep(backoff);
        }

        let task_scope = ctx.download_scope.child();
        let active = Arc::new(ActiveTask::new(task, task_scope.clone()));
        ctx.table.insert(ctx.id, active.clone());

        let outcome = attempt::run_attempt(
            &ctx.url,
            &ctx.headers,
            &active,
            &task_scope,
            &ctx.download_scope,
            &ctx.output,
            &ctx.progress,
            &ctx.config,
        );

        // On a download-wide cancel, the ActiveTask stays registered: the
        // orchestrator's pause handler reads its current_offset/stop_at to
        // synthesize the remaining task after every worker has exited.
        if !matches!(outcome, AttemptOutcome::DownloadCancelled) {
            ctx.table.remove(ctx.id);
        }

        match outcome {
            AttemptOutcome::Completed => return TaskOutcome::Done,
            AttemptOutcome::DownloadCancelled => return TaskOutcome::DownloadCancelled,
            AttemptOutcome::TaskCancelled => {
                let current = active.current_offset.load(Ordering::Acquire);
                let stop_at = active.stop_at.load(Ordering::Acquire);
                let remaining = stop_at.saturating_sub(current);
                if remaining == 0 {
                    return TaskOutcome::Done;
                }
                return TaskOutcome::Requeued(Task::new(current, remaining));
            }
            AttemptOutcome::Failed(err) => {
                let current = active.current_offset.load(Ordering::Acquire);
                let original_end = active.original_end();
                let remaining = original_end.saturating_sub(current);
                if remaining == 0 {
                    return TaskOutcome::Done;
                }
                task = Task::new(current, remaining);
                if attempt_num >= ctx.config.max_task_retries {
                    return TaskOutcome::ExhaustedWithError(task, err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::create_tasks;

    #[test]
    fn backoff_grows_exponentially() {
        let base = Duration::from_millis(200);
        assert_eq!(base * 2u32.pow(0), Duration::from_millis(200));
        assert_eq!(base * 2u32.pow(1), Duration::from_millis(400));
        assert_eq!(base * 2u32.pow(2), Duration::from_millis(800));
    }

    #[test]
    fn create_tasks_smoke() {
        let tasks = create_tasks(1000, 300);
        assert_eq!(tasks.len(), 4);
    }
}
