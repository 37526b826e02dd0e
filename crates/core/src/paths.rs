//! Default locations for depot data directories.
//!
//! | Platform | Artifact cache | Tool homes |
//! |----------|----------------|------------|
//! | **macOS** | `~/Library/Caches/depot/artifacts` | `~/Library/Caches/depot/tools` |
//! | **Linux** | `~/.cache/depot/artifacts` (XDG_CACHE_HOME) | `~/.cache/depot/tools` |
//! | **Windows** | `%LOCALAPPDATA%\depot\artifacts` | `%LOCALAPPDATA%\depot\tools` |
//!
//! Environment variable overrides:
//! - `DEPOT_CACHE_DIR` - Override the artifact cache root
//! - `DEPOT_TOOLS_DIR` - Override the tool installation root

use crate::{Error, Result};
use std::path::PathBuf;

/// Environment variable overriding the artifact cache root.
pub const CACHE_DIR_ENV: &str = "DEPOT_CACHE_DIR";

/// Environment variable overriding the tool installation root.
pub const TOOLS_DIR_ENV: &str = "DEPOT_TOOLS_DIR";

/// Base cache directory for depot.
///
/// # Errors
///
/// Returns an error if the platform cache directory cannot be determined.
pub fn base_cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir()
        .ok_or_else(|| Error::configuration("Could not determine cache directory"))?;
    Ok(base.join("depot"))
}

/// Root of the local artifact cache.
///
/// Resolution order:
/// 1. `DEPOT_CACHE_DIR` environment variable
/// 2. Platform cache directory + `/depot/artifacts`
pub fn artifact_cache_dir() -> Result<PathBuf> {
    if let Some(dir) = env_override(CACHE_DIR_ENV) {
        return Ok(dir);
    }
    Ok(base_cache_dir()?.join("artifacts"))
}

/// Root under which tool versions are installed.
///
/// Resolution order:
/// 1. `DEPOT_TOOLS_DIR` environment variable
/// 2. Platform cache directory + `/depot/tools`
pub fn tools_dir() -> Result<PathBuf> {
    if let Some(dir) = env_override(TOOLS_DIR_ENV) {
        return Ok(dir);
    }
    Ok(base_cache_dir()?.join("tools"))
}

fn env_override(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}
