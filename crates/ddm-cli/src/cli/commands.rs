//! Command implementations: `download`, `resume`, `list`.
//!
//! Each wires the probe -> `Orchestrator::download` -> summary pipeline;
//! the engine itself never touches the network probe, the state directory,
//! or Ctrl-C, those are this binary's job.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use ddm_core::cancel::CancelScope;
use ddm_core::config::EngineConfig;
use ddm_core::orchestrator::{self, DownloadOutcome, DownloadRequest};
use ddm_core::probe;
use ddm_core::progress::ProgressState;
use ddm_core::state::{LoadResult, StateStore};

use super::parse_headers;
use super::progress_printer;

pub fn run_download(
    cfg: &EngineConfig,
    url: &str,
    dest: Option<PathBuf>,
    raw_headers: &[String],
    verbose: bool,
) -> Result<()> {
    let headers = parse_headers(raw_headers);
    let store = StateStore::open_default().context("opening state store")?;

    println!("probing {url}");
    let head = probe::probe(url, &headers).with_context(|| format!("probing {url}"))?;
    let total_size = head
        .total_size
        .with_context(|| format!("{url}: server did not report a size"))?;

    let dest_path = resolve_dest(dest, &head.filename)?;
    println!(
        "{url} -> {} ({} bytes, ranges={})",
        dest_path.display(),
        total_size,
        head.supports_ranges
    );

    drive_download(cfg, url, dest_path, total_size, head.filename, headers, &store, verbose)
}

pub fn run_resume(
    cfg: &EngineConfig,
    url: &str,
    dest: PathBuf,
    raw_headers: &[String],
    verbose: bool,
) -> Result<()> {
    let headers = parse_headers(raw_headers);
    let store = StateStore::open_default().context("opening state store")?;
    let dest_str = dest.to_string_lossy().to_string();

    let saved = match store.load(url, &dest_str).context("reading saved state")? {
        LoadResult::Found(s) => s,
        LoadResult::NotFound => bail!("no saved state for {url} -> {}", dest.display()),
        LoadResult::Corrupt(msg) => bail!("saved state for {url} -> {} is corrupt: {msg}", dest.display()),
    };

    println!(
        "resuming {url} -> {} ({} / {} bytes already downloaded)",
        dest.display(),
        saved.downloaded,
        saved.total_size
    );

    drive_download(
        cfg,
        url,
        dest,
        saved.total_size as u64,
        saved.filename,
        headers,
        &store,
        verbose,
    )
}

pub fn run_list() -> Result<()> {
    let store = StateStore::open_default().context("opening state store")?;
    let downloads = store.list_downloads().context("reading master list")?;
    if downloads.is_empty() {
        println!("no known downloads");
        return Ok(());
    }
    for d in downloads {
        println!(
            "{:?}\t{}\t{}\t{} bytes\t{}",
            d.status, d.url, d.dest_path, d.total_size, d.filename
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn drive_download(
    cfg: &EngineConfig,
    url: &str,
    dest_path: PathBuf,
    total_size: u64,
    filename: String,
    headers: std::collections::HashMap<String, String>,
    store: &StateStore,
    verbose: bool,
) -> Result<()> {
    let parent_scope = CancelScope::root();
    let download_scope = parent_scope.child();
    let progress = Arc::new(ProgressState::new(total_size as i64, download_scope));

    {
        let progress = progress.clone();
        let parent_scope = parent_scope.clone();
        ctrlc::set_handler(move || {
            println!("\npausing... (saving state, press Ctrl-C again to force quit)");
            progress.paused.store(true, Ordering::SeqCst);
            parent_scope.cancel();
        })
        .context("installing Ctrl-C handler")?;
    }

    let printer = progress_printer::spawn(progress.clone());

    let req = DownloadRequest {
        url: url.to_string(),
        dest_path,
        filename,
        file_size: total_size,
        headers,
    };

    let start = Instant::now();
    let outcome = orchestrator::download(req, cfg.clone(), progress.clone(), parent_scope, store);
    let _ = printer.join();

    match outcome {
        Ok(DownloadOutcome::Completed) => {
            println!(
                "completed in {:.1}s ({} bytes)",
                start.elapsed().as_secs_f64(),
                progress.downloaded()
            );
            Ok(())
        }
        Ok(DownloadOutcome::Paused) => {
            println!(
                "paused at {} / {} bytes; resume with `ddm resume {url} <dest>`",
                progress.downloaded(),
                total_size
            );
            Ok(())
        }
        Err(e) => {
            if verbose {
                tracing::error!(error = %e, "download failed");
            }
            Err(e.into())
        }
    }
}

/// Resolves the destination path: an explicit `--dest`, or the probed
/// filename placed in the current directory.
fn resolve_dest(dest: Option<PathBuf>, probed_filename: &str) -> Result<PathBuf> {
    match dest {
        Some(d) => Ok(d),
        None => {
            let cwd = std::env::current_dir().context("resolving current directory")?;
            Ok(cwd.join(probed_filename))
        }
    }
}
