//! A single ranged-GET attempt against one `ActiveTask`.
//!
//! Bytes arrive push-style through curl's `write_function`; we clamp every
//! chunk to `stop_at - current_offset` and deliberately return a short write
//! count when a chunk would cross that boundary. libcurl treats a short
//! write as a hard error and aborts the transfer (`CURLE_WRITE_ERROR`), which
//! is exactly the "stop exactly at stop_at" behavior a task boundary or a
//! mid-flight steal needs, with no separate cancellation plumbing required
//! for that one case.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::active_task::ActiveTask;
use crate::cancel::CancelScope;
use crate::config::EngineConfig;
use crate::error::DownloadError;
use crate::progress::ProgressState;
use crate::storage::OutputFile;
use crate::util::now_unix_nanos;

pub const SPEED_WINDOW: Duration = Duration::from_secs(2);

/// How an attempt ended, already classified against the two cancel scopes.
pub enum AttemptOutcome {
    /// `current_offset` reached `stop_at`; the task's range is fully written.
    Completed,
    /// The whole download was cancelled (pause or caller shutdown).
    DownloadCancelled,
    /// Only this task's scope was cancelled (health monitor killed it).
    TaskCancelled,
    Failed(DownloadError),
}

pub fn run_attempt(
    url: &str,
    custom_headers: &HashMap<String, String>,
    active: &Arc<ActiveTask>,
    task_scope: &CancelScope,
    download_scope: &CancelScope,
    output: &OutputFile,
    progress: &ProgressState,
    config: &EngineConfig,
) -> AttemptOutcome {
    let io_error: RefCell<Option<std::io::Error>> = RefCell::new(None);

    let mut easy = curl::easy::Easy::new();
    if let Err(e) = configure_easy(&mut easy, url, custom_headers, active, config) {
        return AttemptOutcome::Failed(e.into());
    }

    let perform_result = {
        let mut transfer = easy.transfer();

        let write_result = transfer.write_function(|data| {
            let current = active.current_offset.load(Ordering::Acquire);
            let stop_at = active.stop_at.load(Ordering::Acquire);
            let remaining = stop_at.saturating_sub(current);
            let n = data.len().min(remaining as usize);

            if n == 0 {
                return Ok(0);
            }

            if let Err(e) = output.write_at(current, &data[..n]) {
                *io_error.borrow_mut() = Some(e);
                return Ok(0);
            }

            active.current_offset.store(current + n as u64, Ordering::Release);
            active.window_bytes.fetch_add(n as u64, Ordering::Relaxed);
            active
                .last_activity_nanos
                .store(now_unix_nanos(), Ordering::Relaxed);
            progress.downloaded.fetch_add(n as i64, Ordering::Relaxed);
            active.maybe_update_speed(SPEED_WINDOW, config.speed_ema_alpha);

            Ok(n)
        });
        if let Err(e) = write_result {
            return AttemptOutcome::Failed(e.into());
        }

        let task_scope = task_scope.clone();
        let download_scope = download_scope.clone();
        let progress_result = transfer.progress_function(move |_, _, _, _| {
            !(task_scope.is_cancelled() || download_scope.is_cancelled())
        });
        if let Err(e) = progress_result {
            return AttemptOutcome::Failed(e.into());
        }

        transfer.perform()
    };

    classify_outcome(active, io_error.into_inner(), perform_result, &easy, task_scope, download_scope)
}

fn configure_easy(
    easy: &mut curl::easy::Easy,
    url: &str,
    custom_headers: &HashMap<String, String>,
    active: &Arc<ActiveTask>,
    config: &EngineConfig,
) -> Result<(), curl::Error> {
    let start = active.current_offset.load(Ordering::Acquire);
    let end = active.stop_at.load(Ordering::Acquire).saturating_sub(1);

    easy.url(url)?;
    easy.useragent(&config.user_agent)?;
    easy.follow_location(true)?;
    easy.http_version(curl::easy::HttpVersion::V11)?;
    easy.range(&format!("{}-{}", start, end))?;
    easy.buffer_size(config.worker_buffer_size)?;
    // Dial + TLS handshake share libcurl's single connect-phase timeout.
    easy.connect_timeout(Duration::from_secs(10))?;
    easy.tcp_keepalive(true)?;
    easy.tcp_keepidle(Duration::from_secs(30))?;
    easy.accept_encoding("identity")?;
    easy.progress(true)?;

    let mut list = curl::easy::List::new();
    for (k, v) in custom_headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if !custom_headers.is_empty() {
        easy.http_headers(list)?;
    }

    Ok(())
}

fn classify_outcome(
    active: &Arc<ActiveTask>,
    io_error: Option<std::io::Error>,
    perform_result: Result<(), curl::Error>,
    easy: &curl::easy::Easy,
    task_scope: &CancelScope,
    download_scope: &CancelScope,
) -> AttemptOutcome {
    let current = active.current_offset.load(Ordering::Acquire);
    let stop_at = active.stop_at.load(Ordering::Acquire);
    if current >= stop_at {
        return AttemptOutcome::Completed;
    }

    if let Some(e) = io_error {
        return AttemptOutcome::Failed(DownloadError::Io(e));
    }

    if download_scope.is_cancelled() {
        return AttemptOutcome::DownloadCancelled;
    }
    if task_scope.is_self_cancelled() {
        return AttemptOutcome::TaskCancelled;
    }

    if let Err(e) = perform_result {
        return AttemptOutcome::Failed(e.into());
    }

    match easy.response_code() {
        Ok(code @ (200 | 206)) => {
            let _ = code;
            // Transfer completed without reaching stop_at: a shorter-than-
            // expected body. Treat as an ordinary attempt failure so the
            // retry loop picks up the remainder.
            AttemptOutcome::Failed(DownloadError::Network(
                "response body ended before the requested range was filled".into(),
            ))
        }
        Ok(code) => AttemptOutcome::Failed(DownloadError::HttpStatus(code)),
        Err(e) => AttemptOutcome::Failed(e.into()),
    }
}
