//! Typed errors for the download engine core.
//!
//! Leaf-level failures use this `thiserror` enum; `anyhow` takes over at the
//! CLI/orchestrator boundary where errors from several different subsystems
//! (config, state store, HTTP) need to be threaded through one `Result`.

use thiserror::Error;

/// The seven error kinds the engine's components can produce.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Malformed URL or destination path.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Dial/TLS/read failure, or any other libcurl-reported error.
    #[error("network error: {0}")]
    Network(String),

    /// Server responded with a status the engine doesn't accept.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u32),

    /// File write/sync/rename failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cancellation scope was observed cancelled.
    #[error("operation canceled")]
    Canceled,

    /// Pseudo-error: the download was paused. The orchestrator turns this
    /// into `Ok(DownloadOutcome::Paused)`, never an `Err` a caller sees.
    #[error("download paused")]
    Paused,

    /// Saved state could not be parsed; resume falls back to a fresh download.
    #[error("saved state is corrupt: {0}")]
    StateCorrupt(String),
}

impl DownloadError {
    /// True for the pseudo-error used internally to unwind to the pause path.
    pub fn is_paused(&self) -> bool {
        matches!(self, DownloadError::Paused)
    }

    /// True for cancellation, which the orchestrator treats differently from
    /// an ordinary worker error (it does not become "the" download error).
    pub fn is_canceled(&self) -> bool {
        matches!(self, DownloadError::Canceled)
    }
}

impl From<curl::Error> for DownloadError {
    fn from(e: curl::Error) -> Self {
        DownloadError::Network(e.to_string())
    }
}
