//! Archive unpacking.
//!
//! Supports gzip-compressed tarballs and zip archives. Anything else is
//! treated as a bare executable.

use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, trace};

/// Container format of a downloaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.tar.gz` / `.tgz`
    TarGz,
    /// `.zip`
    Zip,
    /// A single executable, not an archive.
    Raw,
}

impl ArchiveFormat {
    /// Pick the format from the archive URL's suffix.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Self::TarGz
        } else if path.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Raw
        }
    }
}

/// Unpack `data` into `dest`.
///
/// `strip_components` leading path components are dropped from every entry;
/// entries left empty are skipped. Entries escaping `dest`, whether by path
/// or through a symlink, are rejected. A
/// [`ArchiveFormat::Raw`] payload is written to `dest/raw_target` as an
/// executable.
pub fn unpack(
    data: &[u8],
    format: ArchiveFormat,
    dest: &Path,
    strip_components: usize,
    raw_target: &Path,
) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    debug!(?format, ?dest, bytes = data.len(), "Unpacking archive");

    match format {
        ArchiveFormat::TarGz => unpack_tar_gz(data, dest, strip_components),
        ArchiveFormat::Zip => unpack_zip(data, dest, strip_components),
        ArchiveFormat::Raw => {
            let target = dest.join(
                sanitize(raw_target, 0)
                    .ok_or_else(|| invalid(format!("invalid executable path {raw_target:?}")))?,
            );
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, data)?;
            set_mode(&target, 0o755)
        }
    }
}

fn unpack_tar_gz(data: &[u8], dest: &Path, strip_components: usize) -> std::io::Result<()> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(relative) = sanitize(&path, strip_components) else {
            trace!(?path, "Skipping entry");
            continue;
        };
        reject_symlinked_parents(dest, &relative)?;

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
            std::fs::remove_file(&target)?;
        }

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let link = entry
                .link_name()?
                .ok_or_else(|| invalid(format!("link entry {path:?} has no target")))?
                .into_owned();

            if kind.is_hard_link() {
                // Hard link targets name another entry of the same archive
                let source = sanitize(&link, strip_components)
                    .ok_or_else(|| invalid(format!("hard link {path:?} escapes the archive")))?;
                reject_symlinked_parents(dest, &source)?;
                std::fs::hard_link(dest.join(source), &target)?;
                continue;
            }
            if !link_stays_within(&relative, &link) {
                return Err(invalid(format!(
                    "symlink {path:?} points outside the archive: {link:?}"
                )));
            }
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

/// Fail if any directory between `dest` and `relative` is a symlink.
fn reject_symlinked_parents(dest: &Path, relative: &Path) -> std::io::Result<()> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    let mut current = dest.to_path_buf();
    for component in parent.components() {
        current.push(component);
        if std::fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(invalid(format!(
                "entry {relative:?} would be written through symlink {current:?}"
            )));
        }
    }
    Ok(())
}

/// Whether a symlink at `relative` pointing to `link` resolves inside the
/// unpack root, judged lexically.
fn link_stays_within(relative: &Path, link: &Path) -> bool {
    let mut depth = relative.components().count().saturating_sub(1);
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn unpack_zip(data: &[u8], dest: &Path, strip_components: usize) -> std::io::Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| invalid(format!("failed to open zip: {e}")))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| invalid(format!("failed to read zip entry: {e}")))?;

        let Some(relative) = file
            .enclosed_name()
            .and_then(|name| sanitize(&name, strip_components))
        else {
            trace!(name = file.name(), "Skipping entry");
            continue;
        };
        let target = dest.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        std::fs::write(&target, &content)?;

        if let Some(mode) = file.unix_mode() {
            set_mode(&target, mode)?;
        }
    }
    Ok(())
}

/// Normal components of `path` after dropping `strip` of them.
///
/// Returns `None` for paths that are empty afterwards or that contain
/// anything but plain names (`..`, roots, prefixes).
fn sanitize(path: &Path, strip: usize) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let kept: PathBuf = parts.into_iter().skip(strip).collect();
    (!kept.as_os_str().is_empty()).then_some(kept)
}

fn invalid(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
