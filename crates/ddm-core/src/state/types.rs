//! Persisted shapes: a single download's resumable state, and the master
//! index of all downloads the store knows about.

use serde::{Deserialize, Serialize};

use crate::task::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadState {
    pub state_hash: String,
    pub url_hash: String,
    pub url: String,
    pub dest_path: String,
    pub total_size: i64,
    pub downloaded: i64,
    pub filename: String,
    pub tasks: Vec<Task>,
    pub created_at: i64,
    pub paused_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Paused,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterListEntry {
    pub state_hash: String,
    pub url_hash: String,
    pub url: String,
    pub dest_path: String,
    pub filename: String,
    pub status: DownloadStatus,
    pub total_size: i64,
    pub completed_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterList {
    #[serde(default)]
    pub downloads: Vec<MasterListEntry>,
}
