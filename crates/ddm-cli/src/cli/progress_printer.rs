//! Periodic plain-text progress line printed to stdout while a download
//! runs. The terminal UI itself is out of scope for this crate; this is
//! just enough for the CLI to be usable without a TUI dependency.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ddm_core::progress::ProgressState;

const TICK: Duration = Duration::from_millis(500);

/// Spawns a thread that prints a `\r`-updated progress line until `done` or
/// `paused` is observed on `progress`. Returns the join handle so the caller
/// can wait for the final line to flush before printing a summary.
pub fn spawn(progress: Arc<ProgressState>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let start = Instant::now();
        let mut last_bytes = 0i64;
        let mut last_tick = start;
        loop {
            thread::sleep(TICK);
            let downloaded = progress.downloaded();
            let now = Instant::now();
            let elapsed = now.duration_since(last_tick).as_secs_f64().max(0.001);
            let speed = ((downloaded - last_bytes).max(0) as f64 / elapsed) as u64;
            last_bytes = downloaded;
            last_tick = now;

            print_line(&progress, downloaded, speed);

            if progress.done.load(Ordering::SeqCst) || progress.paused.load(Ordering::SeqCst) {
                break;
            }
        }
        println!();
    })
}

fn print_line(progress: &ProgressState, downloaded: i64, speed_bps: u64) {
    let percent = progress.percent();
    let workers = progress.active_workers.load(Ordering::SeqCst);
    print!(
        "\r\x1b[Kdownloaded {} / {} ({:.1}%)  {}/s  workers={}",
        human_bytes(downloaded.max(0) as u64),
        human_bytes(progress.total_size.max(0) as u64),
        percent,
        human_bytes(speed_bps),
        workers,
    );
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
