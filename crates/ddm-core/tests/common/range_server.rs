//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single static body. Responds to HEAD with Content-Length and
//! Accept-Ranges: bytes; responds to GET with Range with 206 Partial Content.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` header even if ranges work.
    pub advertise_ranges: bool,
    /// If set, every GET response is truncated to at most this many bytes
    /// (while still advertising the full `Content-Length`), simulating a
    /// connection that drops mid-transfer. Each truncated request increments
    /// the shared counter returned alongside the server handle.
    pub fail_after_bytes: Option<u64>,
    /// If set, the body is written in pieces of this size with a sleep
    /// between each, slowing the transfer enough for a test to observe and
    /// act on intermediate progress (e.g. triggering a pause mid-transfer).
    pub throttle: Option<(usize, Duration)>,
    /// If set, requests whose range start is below the given offset use this
    /// (harsher) throttle instead of `throttle`, so a test can make one
    /// region of the file much slower than the rest rather than uniformly
    /// slow or uniformly fast.
    pub slow_region: Option<(u64, usize, Duration)>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            fail_after_bytes: None,
            throttle: None,
            slow_region: None,
        }
    }
}

/// Starts a server in a background thread serving `body`. Returns the base URL
/// (e.g. "http://127.0.0.1:12345/"). The server runs until the process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but allows customizing server behavior (HEAD blocked, ranges missing, etc.).
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let (url, _) = start_with_options_counted(body, opts);
    url
}

/// Like `start_with_options`, additionally returning a counter of requests
/// that were truncated by `fail_after_bytes` (always 0 if that option is unset).
pub fn start_with_options_counted(body: Vec<u8>, opts: RangeServerOptions) -> (String, Arc<AtomicU64>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let failures = Arc::new(AtomicU64::new(0));
    let failures_bg = failures.clone();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let failures = failures_bg.clone();
            thread::spawn(move || handle(stream, &body, opts, &failures));
        }
    });
    (format!("http://127.0.0.1:{}/", port), failures)
}

fn handle(mut stream: std::net::TcpStream, body: &[u8], opts: RangeServerOptions, failures: &AtomicU64) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;
    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
            return;
        }
        let accept_ranges = if opts.advertise_ranges && opts.support_ranges {
            "Accept-Ranges: bytes\r\n"
        } else {
            ""
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\
\r\n",
            total, accept_ranges
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if method.eq_ignore_ascii_case("GET") {
        let use_range = opts.support_ranges;
        let request_start: u64 = if use_range { range.map(|(s, _)| s).unwrap_or(0) } else { 0 };
        let (status, range_header, slice) = if use_range {
            if let Some((start, end_incl)) = range {
            let start = start.min(total);
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                (
                    "416 Range Not Satisfiable",
                    format!("bytes */{}", total),
                    &body[0..0],
                )
            } else {
                let start = start as usize;
                let end_excl = (end_incl + 1).min(total) as usize;
                let slice = body.get(start..end_excl).unwrap_or(&body[0..0]);
                (
                    "206 Partial Content",
                    format!("bytes {}-{}/{}", start, end_excl.saturating_sub(1), total),
                    slice,
                )
            }
            } else {
            (
                "200 OK",
                format!("bytes 0-{}/{}", total.saturating_sub(1), total),
                body,
            )
            }
        } else {
            (
                "200 OK",
                format!("bytes 0-{}/{}", total.saturating_sub(1), total),
                body,
            )
        };
        let accept_ranges = if opts.advertise_ranges && opts.support_ranges {
            "Accept-Ranges: bytes\r\n"
        } else {
            ""
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Range: {}\r\n{}\
\r\n",
            status, slice.len(), range_header, accept_ranges
        );
        let _ = stream.write_all(response.as_bytes());

        let effective_throttle = match opts.slow_region {
            Some((below, piece, delay)) if request_start < below => Some((piece, delay)),
            _ => opts.throttle,
        };

        match opts.fail_after_bytes {
            Some(cap) if (slice.len() as u64) > cap => {
                let cap = cap as usize;
                write_throttled(&mut stream, &slice[..cap], effective_throttle);
                failures.fetch_add(1, Ordering::SeqCst);
                // Drop the connection without sending the rest of the body,
                // despite the Content-Length promise above; the client sees
                // a short, incomplete transfer and must retry.
            }
            _ => {
                write_throttled(&mut stream, slice, effective_throttle);
            }
        }
        return;
    }
    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
}

/// Writes `data` to `stream`, optionally in small pieces with a sleep
/// between each. Used to slow a transfer down enough for a test thread to
/// observe and act on partial progress before the response completes.
fn write_throttled(stream: &mut std::net::TcpStream, data: &[u8], throttle: Option<(usize, Duration)>) {
    match throttle {
        Some((piece, delay)) if piece > 0 => {
            for chunk in data.chunks(piece) {
                if stream.write_all(chunk).is_err() {
                    return;
                }
                thread::sleep(delay);
            }
        }
        _ => {
            let _ = stream.write_all(data);
        }
    }
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if value.to_lowercase().starts_with("bytes=") {
                    let part = value[6..].trim();
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
