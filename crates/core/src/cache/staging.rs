//! Staged writes into the local cache.
//!
//! Content is written to `<root>/.staging/` first and only renamed into its
//! coordinate-derived location on [`StagedFile::commit`]. Readers checking the
//! final path therefore see either nothing or the complete file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::{Error, Result};

/// Directory under the cache root that holds in-progress writes.
pub const STAGING_DIR: &str = ".staging";

/// A fully written file waiting to be moved into the cache.
///
/// Dropping an uncommitted stage removes its temporary file.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Write `data` to a fresh temporary file under `staging_dir`.
    pub(crate) fn write(staging_dir: &Path, dest: PathBuf, data: &[u8]) -> Result<Self> {
        fs::create_dir_all(staging_dir).map_err(|e| Error::io(e, staging_dir, "create_dir_all"))?;

        let file_name = dest
            .file_name()
            .map_or_else(|| "entry".to_string(), |n| n.to_string_lossy().into_owned());
        let temp = staging_dir.join(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let staged = Self {
            temp,
            dest,
            committed: false,
        };

        let mut file =
            fs::File::create(&staged.temp).map_err(|e| Error::io(e, &staged.temp, "create"))?;
        file.write_all(data)
            .map_err(|e| Error::io(e, &staged.temp, "write"))?;
        file.sync_all()
            .map_err(|e| Error::io(e, &staged.temp, "sync"))?;
        drop(file);

        trace!(temp = ?staged.temp, dest = ?staged.dest, bytes = data.len(), "Staged cache write");
        Ok(staged)
    }

    /// Temporary location of the staged content.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Move the staged content into its final location.
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(parent) = self.dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }

        // Atomic rename to final location
        fs::rename(&self.temp, &self.dest).map_err(|e| Error::io(e, &self.dest, "rename"))?;
        self.committed = true;
        Ok(self.dest.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}
