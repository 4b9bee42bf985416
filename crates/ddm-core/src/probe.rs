//! Capability probe: a ranged `GET bytes=0-0` to learn total size, range
//! support, and a filename hint before the orchestrator plans tasks.
//!
//! This is the one concrete external-collaborator implementation shipped in
//! the crate so the CLI has something to call; the orchestrator itself never
//! calls it, the caller wires the result in.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::str;
use std::time::Duration;

use crate::url_model::derive_filename;

/// Outcome of a capability probe.
#[derive(Debug, Clone)]
pub struct HeadProbe {
    /// Total size in bytes, if known. `None` when the server answered `206`
    /// with an unknown-length `Content-Range: bytes 0-0/*`.
    pub total_size: Option<u64>,
    /// True when the server answered `206` to our ranged request.
    pub supports_ranges: bool,
    pub filename: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Issue `GET url` with `Range: bytes=0-0` and parse size/range-support/filename.
pub fn probe(url: &str, custom_headers: &HashMap<String, String>) -> Result<HeadProbe> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.range("0-0")?;
    easy.http_version(curl::easy::HttpVersion::V11)?;
    easy.connect_timeout(Duration::from_secs(10))?;
    easy.timeout(Duration::from_secs(30))?;

    let mut list = curl::easy::List::new();
    for (k, v) in custom_headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if !custom_headers.is_empty() {
        easy.http_headers(list)?;
    }

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        // The body of a 0-0 range response is at most one byte; discard it.
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.perform().context("probe request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    parse_probe(url, code, &headers)
}

fn parse_probe(url: &str, code: u32, lines: &[String]) -> Result<HeadProbe> {
    let mut content_length: Option<u64> = None;
    let mut content_range: Option<String> = None;
    let mut etag = None;
    let mut last_modified = None;
    let mut content_disposition: Option<String> = None;

    for line in lines {
        let line = line.trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("content-range") {
            content_range = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("etag") {
            etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            last_modified = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-disposition") {
            content_disposition = Some(value.to_string());
        }
    }

    let (total_size, supports_ranges) = match code {
        206 => {
            let range = content_range.as_deref().unwrap_or("");
            let size = range
                .rsplit_once('/')
                .map(|(_, total)| total)
                .and_then(|total| if total == "*" { None } else { total.parse::<u64>().ok() });
            (size, true)
        }
        200 => (content_length, false),
        other => bail!("probe {} returned unexpected HTTP status {}", url, other),
    };

    let filename = derive_filename(url, content_disposition.as_deref());

    Ok(HeadProbe {
        total_size,
        supports_ranges,
        filename,
        etag,
        last_modified,
    })
}
