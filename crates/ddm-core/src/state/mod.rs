//! `StateStore`: JSON persistence for pause/resume, plus a master list index
//! of every download the store has ever paused, completed, or errored on.
//!
//! The directory is an injected collaborator, not a hardcoded path: the CLI
//! points it at the XDG state home, tests point it at a temp directory.

mod hash;
mod types;

pub use hash::{state_hash, url_hash};
pub use types::{DownloadState, DownloadStatus, MasterList, MasterListEntry};

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::util::now_unix_secs;

const MASTER_LIST_FILE: &str = "downloads.json";

/// Distinguishes "no saved state" from a state file that failed to parse.
pub enum LoadResult {
    NotFound,
    Found(DownloadState),
    Corrupt(String),
}

#[derive(Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Opens the store rooted at the XDG state home (`~/.local/state/ddm`).
    pub fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("ddm")?;
        Ok(Self {
            dir: xdg_dirs.get_state_home(),
        })
    }

    /// Opens the store rooted at an arbitrary directory (tests, or a
    /// caller-chosen override).
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| format!("creating state dir {}", self.dir.display()))
    }

    fn state_file_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.json"))
    }

    /// Persist `state` (with `state_hash`/`url_hash`/`paused_at` filled in)
    /// and upsert the master-list entry for it with status `paused`.
    pub fn save(&self, url: &str, dest_path: &str, mut state: DownloadState) -> Result<()> {
        self.ensure_dir()?;
        let h = state_hash(url, dest_path);
        state.state_hash = h.clone();
        state.url_hash = url_hash(url);
        state.paused_at = now_unix_secs();

        let path = self.state_file_path(&h);
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(&path, json).with_context(|| format!("writing state file {}", path.display()))?;

        self.upsert_master_entry(MasterListEntry {
            state_hash: state.state_hash.clone(),
            url_hash: state.url_hash.clone(),
            url: url.to_string(),
            dest_path: dest_path.to_string(),
            filename: state.filename.clone(),
            status: DownloadStatus::Paused,
            total_size: state.total_size,
            completed_at: 0,
        })
    }

    pub fn load(&self, url: &str, dest_path: &str) -> Result<LoadResult> {
        let h = state_hash(url, dest_path);
        let path = self.state_file_path(&h);
        if !path.exists() {
            return Ok(LoadResult::NotFound);
        }
        let data = fs::read_to_string(&path)?;
        match serde_json::from_str::<DownloadState>(&data) {
            Ok(state) => Ok(LoadResult::Found(state)),
            Err(e) => Ok(LoadResult::Corrupt(e.to_string())),
        }
    }

    /// Remove the state file (missing is fine) and drop the matching
    /// master-list entry.
    pub fn delete(&self, url: &str, dest_path: &str) -> Result<()> {
        let h = state_hash(url, dest_path);
        let path = self.state_file_path(&h);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("removing state file {}", path.display()))?;
        }
        self.remove_master_entry(&h, &url_hash(url))
    }

    /// Upsert a terminal-status entry (`completed` or `error`), used by the
    /// orchestrator's success/failure shutdown paths.
    pub fn record_status(
        &self,
        url: &str,
        dest_path: &str,
        filename: &str,
        total_size: i64,
        status: DownloadStatus,
    ) -> Result<()> {
        self.upsert_master_entry(MasterListEntry {
            state_hash: state_hash(url, dest_path),
            url_hash: url_hash(url),
            url: url.to_string(),
            dest_path: dest_path.to_string(),
            filename: filename.to_string(),
            status,
            total_size,
            completed_at: now_unix_secs(),
        })
    }

    pub fn list_downloads(&self) -> Result<Vec<MasterListEntry>> {
        Ok(self.load_master_list()?.downloads)
    }

    fn master_list_path(&self) -> PathBuf {
        self.dir.join(MASTER_LIST_FILE)
    }

    fn load_master_list(&self) -> Result<MasterList> {
        let path = self.master_list_path();
        if !path.exists() {
            return Ok(MasterList::default());
        }
        let data = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data).unwrap_or_default())
    }

    fn save_master_list(&self, list: &MasterList) -> Result<()> {
        self.ensure_dir()?;
        let path = self.master_list_path();
        let json = serde_json::to_string_pretty(list)?;
        fs::write(&path, json).with_context(|| format!("writing master list {}", path.display()))
    }

    fn upsert_master_entry(&self, entry: MasterListEntry) -> Result<()> {
        let mut list = self.load_master_list()?;
        if let Some(existing) = list
            .downloads
            .iter_mut()
            .find(|e| matches_entry(e, &entry.state_hash))
        {
            *existing = entry;
        } else {
            list.downloads.push(entry);
        }
        self.save_master_list(&list)
    }

    fn remove_master_entry(&self, state_hash: &str, url_hash: &str) -> Result<()> {
        let mut list = self.load_master_list()?;
        list.downloads
            .retain(|e| !(matches_entry(e, state_hash) || matches_entry(e, url_hash)));
        self.save_master_list(&list)
    }
}

fn matches_entry(entry: &MasterListEntry, hash: &str) -> bool {
    if !entry.state_hash.is_empty() {
        entry.state_hash == hash
    } else {
        entry.url_hash == hash
    }
}
