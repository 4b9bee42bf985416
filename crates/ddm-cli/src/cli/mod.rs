//! CLI for the DDM segmented download manager.

mod commands;
mod progress_printer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_download, run_list, run_resume};

/// Top-level CLI for the DDM segmented download manager.
#[derive(Debug, Parser)]
#[command(name = "ddm")]
#[command(about = "DDM: multi-connection segmented download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Start a new segmented download. Press Ctrl-C once to pause and save state.
    Download {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Destination file path (default: derived from the URL/server, in the current directory).
        #[arg(long, value_name = "PATH")]
        dest: Option<PathBuf>,
        /// Extra request header, `Name: Value`. May be repeated.
        #[arg(long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// Print debug-level progress lines in addition to the summary.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Resume a previously paused download. Fails if no saved state matches
    /// the (url, dest) pair.
    Resume {
        /// Direct HTTP/HTTPS URL originally passed to `download`.
        url: String,
        /// Destination file path originally passed to `download`.
        dest: PathBuf,
        /// Extra request header, `Name: Value`. May be repeated.
        #[arg(long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// Print debug-level progress lines in addition to the summary.
        #[arg(short, long)]
        verbose: bool,
    },

    /// List known downloads (paused, completed, errored) from the master list.
    List,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = ddm_core::config::load_or_init()?;
        tracing::debug!(?cfg, "loaded config");

        match cli.command {
            CliCommand::Download {
                url,
                dest,
                headers,
                verbose,
            } => run_download(&cfg, &url, dest, &headers, verbose),
            CliCommand::Resume {
                url,
                dest,
                headers,
                verbose,
            } => run_resume(&cfg, &url, dest, &headers, verbose),
            CliCommand::List => run_list(),
        }
    }
}

/// Parses repeated `--header "Name: Value"` flags into a map. Malformed
/// entries (no `:`) are skipped with a warning rather than failing the run.
pub(crate) fn parse_headers(raw: &[String]) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for h in raw {
        match h.split_once(':') {
            Some((k, v)) => {
                map.insert(k.trim().to_string(), v.trim().to_string());
            }
            None => tracing::warn!(header = %h, "ignoring malformed --header (expected \"Name: Value\")"),
        }
    }
    map
}
