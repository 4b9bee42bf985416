//! Output file lifecycle: create/preallocate a `.part` temp file, accept
//! concurrent positioned writes from workers, and atomically rename to the
//! final destination on success.

use anyhow::{Context, Result};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Temp file suffix used before the atomic rename to the final path.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the in-progress temp file next to `final_path`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Builder for a fresh temp file. Call `preallocate` then `build`.
pub struct OutputFileBuilder {
    file: File,
    temp_path: PathBuf,
}

impl OutputFileBuilder {
    /// Create (or truncate) a temp file at `temp_path`.
    pub fn create(temp_path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)
            .with_context(|| format!("failed to create output file: {}", temp_path.display()))?;
        Ok(Self {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Preallocate `size` bytes. Tries `posix_fallocate` on Unix for real
    /// block allocation; falls back to `set_len` on failure or elsewhere.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file.set_len(size).context("failed to preallocate output file")?;
        Ok(())
    }

    pub fn build(self) -> OutputFile {
        OutputFile {
            file: Arc::new(self.file),
            temp_path: Arc::new(self.temp_path),
        }
    }
}

/// A shared handle to the in-progress output file. Cheap to clone; every
/// worker writes through its own clone, each `write_at` call independent.
#[derive(Clone)]
pub struct OutputFile {
    file: Arc<File>,
    temp_path: Arc<PathBuf>,
}

impl OutputFile {
    /// Open an existing temp file for resume. Does not truncate; the file
    /// must already have been preallocated by a prior run.
    pub fn open_existing(temp_path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(temp_path)
            .with_context(|| format!("failed to reopen output file: {}", temp_path.display()))?;
        Ok(Self {
            file: Arc::new(file),
            temp_path: Arc::new(temp_path.to_path_buf()),
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Write `data` at `offset`. Independent of the file's logical cursor;
    /// safe to call concurrently from multiple workers at disjoint offsets.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        let n = self.file.write_at(data, offset)?;
        if n != data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", n, data.len()),
            ));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("output file fsync failed")
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Rename the temp file to `final_path`. Consumes every remaining clone's
    /// reference by dropping the file handle before the rename (required on
    /// some platforms to release the fd).
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        let temp_path = (*self.temp_path).clone();
        drop(self.file);
        std::fs::rename(&temp_path, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })?;
        Ok(())
    }
}
