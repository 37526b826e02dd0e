//! Configuration types for depot.
//!
//! Configuration is read from a `depot.toml` file found in the project
//! directory or one of its parents:
//!
//! ```toml
//! [cache]
//! root = ".depot/cache"
//!
//! [resolve]
//! parallelism = 8
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 200
//!
//! [[repositories]]
//! id = "central"
//! url = "https://repo.example.com/releases"
//!
//! [tools.specs.node]
//! executable = "bin/node"
//! strip_components = 1
//! archives = { linux-x86_64 = "https://nodejs.org/dist/v{version}/node-v{version}-linux-x64.tar.gz" }
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache::LocalCache;
use crate::paths;
use crate::recovery::RecoveryPolicy;
use crate::tools::ToolSpec;
use crate::{Error, Result};

/// Name of the per-project configuration file.
pub const CONFIG_FILE: &str = "depot.toml";

/// Main configuration structure for depot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Local cache settings.
    pub cache: CacheConfig,
    /// Resolution settings.
    pub resolve: ResolveConfig,
    /// Bounds for recovering flaky acquisitions.
    pub retry: RecoveryPolicy,
    /// Repositories in fallback order.
    pub repositories: Vec<RepositoryConfig>,
    /// Tool bootstrap settings.
    pub tools: ToolsConfig,
}

/// Local cache settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; defaults to the per-user cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// Resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Maximum number of artifacts acquired concurrently.
    pub parallelism: usize,
    /// Re-acquire artifacts that are already cached.
    pub force: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            force: false,
        }
    }
}

/// One repository in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Identifier used in logs and errors; defaults to the URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Base location (`https://…`, `http://…`, `file://…` or a directory path).
    pub url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RepositoryConfig {
    /// Repository at `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Identifier of this repository.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }
}

/// Tool bootstrap settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Root under which `<name>/<version>/` homes are created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Known tools by name.
    pub specs: BTreeMap<String, ToolSpec>,
}

fn default_parallelism() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    30
}

impl DepotConfig {
    /// Parse configuration text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::configuration(
                "retry.max_attempts must be at least 1",
            ));
        }
        Ok(())
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        let mut config = Self::from_toml(&text)
            .map_err(|e| Error::configuration(format!("{}: {e}", path.display())))?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        debug!(?path, repositories = config.repositories.len(), "Loaded configuration");
        Ok(config)
    }

    /// Find `depot.toml` in `start` or its ancestors.
    #[must_use]
    pub fn discover(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load the discovered configuration, or defaults if there is none.
    pub fn load_or_default(start: &Path) -> Result<Self> {
        match Self::discover(start) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Effective cache root: `DEPOT_CACHE_DIR`, then the file, then the default.
    pub fn cache_root(&self) -> Result<PathBuf> {
        if std::env::var_os(paths::CACHE_DIR_ENV).is_some_and(|v| !v.is_empty()) {
            return paths::artifact_cache_dir();
        }
        match &self.cache.root {
            Some(root) => Ok(root.clone()),
            None => paths::artifact_cache_dir(),
        }
    }

    /// Effective tools root: `DEPOT_TOOLS_DIR`, then the file, then the default.
    pub fn tools_root(&self) -> Result<PathBuf> {
        if std::env::var_os(paths::TOOLS_DIR_ENV).is_some_and(|v| !v.is_empty()) {
            return paths::tools_dir();
        }
        match &self.tools.root {
            Some(root) => Ok(root.clone()),
            None => paths::tools_dir(),
        }
    }

    /// Local cache at the effective root.
    pub fn local_cache(&self) -> Result<LocalCache> {
        Ok(LocalCache::new(self.cache_root()?))
    }

    /// Look up a tool specification by name.
    pub fn tool(&self, name: &str) -> Result<&ToolSpec> {
        self.tools.specs.get(name).ok_or_else(|| {
            Error::configuration(format!("no tool named '{name}' in [tools.specs]"))
        })
    }

    fn rebase(&mut self, base: &Path) {
        if let Some(root) = &self.cache.root
            && root.is_relative()
        {
            self.cache.root = Some(base.join(root));
        }
        if let Some(root) = &self.tools.root
            && root.is_relative()
        {
            self.tools.root = Some(base.join(root));
        }
    }
}
