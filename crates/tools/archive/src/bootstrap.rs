//! First-use installation of versioned tools.
//!
//! Layout under the tools root:
//!
//! ```text
//! <tools_root>/
//! └── jq/
//!     ├── 1.6/bin/jq
//!     ├── 1.7/bin/jq
//!     └── .1.8.staging-<uuid>/   # unpack in progress
//! ```
//!
//! A version is installed exactly when its executable exists inside its home.
//! Homes only ever appear through a rename of a fully unpacked staging
//! directory, so a half-unpacked tool is never observed as installed.

use bytes::Bytes;
use depot_core::tools::{Platform, ToolSpec};
use depot_core::{DepotConfig, Error, RecoveryPolicy, RecoveryRule, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extract::{ArchiveFormat, unpack};
use crate::source::{ArchiveSource, HttpArchiveSource};

/// Installs tools into version-scoped homes below a tools root.
#[derive(Clone)]
pub struct ToolBootstrapper {
    tools_root: PathBuf,
    source: Arc<dyn ArchiveSource>,
    policy: RecoveryPolicy,
}

impl ToolBootstrapper {
    /// Create a bootstrapper installing below `tools_root`.
    #[must_use]
    pub fn new(tools_root: impl Into<PathBuf>, source: Arc<dyn ArchiveSource>) -> Self {
        Self {
            tools_root: tools_root.into(),
            source,
            policy: RecoveryPolicy::default(),
        }
    }

    /// Bootstrapper using the configured tools root, retry policy and HTTP downloads.
    pub fn from_config(config: &DepotConfig) -> Result<Self> {
        let source = HttpArchiveSource::new(HttpArchiveSource::DEFAULT_TIMEOUT)?;
        Ok(Self::new(config.tools_root()?, Arc::new(source)).with_policy(config.retry.clone()))
    }

    /// Bounds for retrying downloads that fail transiently.
    #[must_use]
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Root directory holding every tool home.
    #[must_use]
    pub fn tools_root(&self) -> &Path {
        &self.tools_root
    }

    /// Home directory of one tool version.
    #[must_use]
    pub fn home(&self, name: &str, version: &str) -> PathBuf {
        self.tools_root.join(name).join(version)
    }

    /// Where the executable of an installed tool version lives.
    #[must_use]
    pub fn executable(&self, name: &str, spec: &ToolSpec, version: &str, platform: &Platform) -> PathBuf {
        self.home(name, version)
            .join(spec.executable_path(name, version, platform))
    }

    /// Whether the tool version's executable is present.
    #[must_use]
    pub fn is_installed(&self, name: &str, spec: &ToolSpec, version: &str, platform: &Platform) -> bool {
        self.executable(name, spec, version, platform).is_file()
    }

    /// Ensure the tool version is installed and return its executable.
    pub async fn ensure_installed(
        &self,
        name: &str,
        spec: &ToolSpec,
        version: &str,
        platform: &Platform,
    ) -> Result<PathBuf> {
        self.ensure_installed_with_cancellation(name, spec, version, platform, CancellationToken::new())
            .await
    }

    /// [`Self::ensure_installed`], aborting with [`Error::Cancelled`] once
    /// `cancel` fires.
    pub async fn ensure_installed_with_cancellation(
        &self,
        name: &str,
        spec: &ToolSpec,
        version: &str,
        platform: &Platform,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        validate_segment(name, name, version, "tool name")?;
        validate_segment(version, name, version, "version")?;

        let executable = self.executable(name, spec, version, platform);
        if executable.is_file() {
            debug!(tool = name, version, ?executable, "Tool already installed");
            return Ok(executable);
        }

        let url = spec.archive_url(name, version, platform)?;
        info!(tool = name, version, %platform, %url, "Installing tool");

        let data = self
            .download(name, version, &url, cancel.clone())
            .await
            .map_err(|e| install_error(name, version, e))?;

        if let Some(expected) = spec.expected_sha256(platform) {
            verify_sha256(&data, expected).map_err(|message| Error::install_failure(name, version, message))?;
        }

        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("install {name} {version}")));
        }

        let install = Install {
            tool_dir: self.tools_root.join(name),
            home: self.home(name, version),
            relative_executable: spec.executable_path(name, version, platform),
            format: ArchiveFormat::from_url(&url),
            strip_components: spec.strip_components,
        };
        tokio::task::spawn_blocking(move || install.run(&data))
            .await
            .map_err(|e| Error::install_failure(name, version, format!("unpack task failed: {e}")))?
            .map_err(|message| Error::install_failure(name, version, message))?;

        info!(tool = name, version, ?executable, "Tool installed");
        Ok(executable)
    }

    /// Download the archive, retrying transient failures within the policy.
    async fn download(
        &self,
        name: &str,
        version: &str,
        url: &str,
        cancel: CancellationToken,
    ) -> Result<Bytes> {
        let slot: Mutex<Option<Bytes>> = Mutex::new(None);
        let archive = &slot;

        RecoveryRule::new(
            format!("download {name} {version}"),
            || archive.lock().ok().and_then(|guard| guard.clone()),
            Option::is_some,
            move || async move {
                let data = self.source.download(url).await?;
                debug!(tool = name, version, bytes = data.len(), "Archive downloaded");
                if let Ok(mut guard) = archive.lock() {
                    *guard = Some(data);
                }
                Ok(())
            },
        )
        .with_policy(self.policy.clone())
        .with_cancellation(cancel)
        .apply()
        .await?
        .ok_or_else(|| Error::install_failure(name, version, "archive download produced no data"))
    }
}

impl std::fmt::Debug for ToolBootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBootstrapper")
            .field("tools_root", &self.tools_root)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Blocking half of an installation: unpack into staging, then promote.
struct Install {
    tool_dir: PathBuf,
    home: PathBuf,
    relative_executable: PathBuf,
    format: ArchiveFormat,
    strip_components: usize,
}

impl Install {
    fn run(&self, data: &[u8]) -> std::result::Result<(), String> {
        let staging = self.staging_dir();
        let outcome = self.unpack_and_promote(data, &staging);
        if outcome.is_err() && staging.exists() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        outcome
    }

    fn staging_dir(&self) -> PathBuf {
        let version = self
            .home
            .file_name()
            .map_or_else(|| "install".into(), |v| v.to_string_lossy());
        self.tool_dir
            .join(format!(".{version}.staging-{}", uuid::Uuid::new_v4()))
    }

    fn unpack_and_promote(&self, data: &[u8], staging: &Path) -> std::result::Result<(), String> {
        unpack(
            data,
            self.format,
            staging,
            self.strip_components,
            &self.relative_executable,
        )
        .map_err(|e| format!("failed to unpack archive: {e}"))?;

        if !staging.join(&self.relative_executable).is_file() {
            return Err(format!(
                "archive does not contain {}",
                self.relative_executable.display()
            ));
        }

        if self.home.exists() {
            if self.home.join(&self.relative_executable).is_file() {
                debug!(home = ?self.home, "Concurrent install finished first");
                let _ = std::fs::remove_dir_all(staging);
                return Ok(());
            }
            warn!(home = ?self.home, "Replacing incomplete tool home");
            std::fs::remove_dir_all(&self.home)
                .map_err(|e| format!("failed to remove {}: {e}", self.home.display()))?;
        }

        match std::fs::rename(staging, &self.home) {
            Ok(()) => Ok(()),
            Err(_) if self.home.join(&self.relative_executable).is_file() => {
                debug!(home = ?self.home, "Concurrent install finished first");
                let _ = std::fs::remove_dir_all(staging);
                Ok(())
            }
            Err(e) => Err(format!("failed to move tool into {}: {e}", self.home.display())),
        }
    }
}

/// Reject names that would escape the tools root.
fn validate_segment(value: &str, name: &str, version: &str, what: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.starts_with('.')
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control);
    if invalid {
        return Err(Error::install_failure(
            name,
            version,
            format!("invalid {what} '{value}'"),
        ));
    }
    Ok(())
}

fn verify_sha256(data: &[u8], expected: &str) -> std::result::Result<(), String> {
    let actual = hex::encode(Sha256::digest(data));
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(format!("checksum mismatch: expected {expected}, got {actual}"))
    }
}

/// Download failures surface as install failures; cancellation stays distinct.
fn install_error(name: &str, version: &str, error: Error) -> Error {
    match error {
        Error::Cancelled { .. } | Error::InstallFailure { .. } => error,
        other => Error::install_failure(name, version, other.to_string()),
    }
}
