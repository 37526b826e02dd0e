//! Local artifact cache.
//!
//! The cache is a directory tree keyed by coordinate. Each coordinate maps to
//! at most one binary and one descriptor:
//!
//! ```text
//! <root>/
//! ├── .staging/                      # in-progress writes
//! └── org/example/lib/1.0/
//!     ├── lib-1.0.jar
//!     └── lib-1.0.json
//! ```
//!
//! Entries are never evicted and are assumed immutable once written, so a
//! present entry short-circuits any repository access.

mod staging;

pub use staging::{STAGING_DIR, StagedFile};

use std::path::{Path, PathBuf};
use tracing::trace;

use crate::coordinate::Coordinate;
use crate::{Error, Result};

/// Which of a coordinate's two files is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The artifact binary.
    Binary,
    /// The artifact descriptor.
    Descriptor,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Descriptor => write!(f, "descriptor"),
        }
    }
}

/// Observed state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryState {
    /// Whether the descriptor file exists.
    pub descriptor: bool,
    /// Length of the binary file, if it exists.
    pub binary_len: Option<u64>,
}

impl EntryState {
    /// Descriptor present and binary present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.descriptor && self.binary_len.is_some_and(|len| len > 0)
    }
}

/// On-disk artifact cache rooted at an explicit location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    /// Create a cache at the specified root directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.root
    }

    /// Point the cache at a different root.
    ///
    /// Configuration-time operation: callers must not relocate a cache that
    /// is shared with acquisitions still in flight.
    pub fn set_location(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    /// Path of a coordinate's binary, whether or not it exists.
    #[must_use]
    pub fn locate(&self, coordinate: &Coordinate) -> PathBuf {
        self.root.join(coordinate.binary_path())
    }

    /// Path of a coordinate's descriptor, whether or not it exists.
    #[must_use]
    pub fn locate_descriptor(&self, coordinate: &Coordinate) -> PathBuf {
        self.root.join(coordinate.descriptor_path())
    }

    /// Path of either file of a coordinate.
    #[must_use]
    pub fn path_of(&self, coordinate: &Coordinate, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Binary => self.locate(coordinate),
            ArtifactKind::Descriptor => self.locate_descriptor(coordinate),
        }
    }

    /// Whether both the binary and the descriptor are cached.
    #[must_use]
    pub fn is_present(&self, coordinate: &Coordinate) -> bool {
        let present = self.locate(coordinate).is_file() && self.locate_descriptor(coordinate).is_file();
        trace!(%coordinate, present, "Cache lookup");
        present
    }

    /// Negation of [`Self::is_present`].
    #[must_use]
    pub fn is_absent(&self, coordinate: &Coordinate) -> bool {
        !self.is_present(coordinate)
    }

    /// Inspect the entry for a coordinate without reading file contents.
    #[must_use]
    pub fn entry_state(&self, coordinate: &Coordinate) -> EntryState {
        let binary_len = std::fs::metadata(self.locate(coordinate))
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len());
        EntryState {
            descriptor: self.locate_descriptor(coordinate).is_file(),
            binary_len,
        }
    }

    /// Read a cached descriptor, if present.
    pub fn read_descriptor(&self, coordinate: &Coordinate) -> Result<Option<Vec<u8>>> {
        let path = self.locate_descriptor(coordinate);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(e, path, "read")),
        }
    }

    /// Directory holding in-progress writes.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Write content for a coordinate to the staging area.
    ///
    /// Nothing becomes visible under the coordinate's path until the returned
    /// [`StagedFile`] is committed.
    pub fn stage(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        data: &[u8],
    ) -> Result<StagedFile> {
        StagedFile::write(&self.staging_dir(), self.path_of(coordinate, kind), data)
    }

    /// Stage and immediately commit content for a coordinate.
    pub fn store(&self, coordinate: &Coordinate, kind: ArtifactKind, data: &[u8]) -> Result<PathBuf> {
        self.stage(coordinate, kind, data)?.commit()
    }
}
