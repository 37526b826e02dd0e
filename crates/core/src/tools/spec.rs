//! Tool specifications: where a tool's archives live and what they contain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::platform::Platform;
use crate::{Error, Result};

/// Archive key used when no platform-specific entry exists.
pub const DEFAULT_ARCHIVE_KEY: &str = "default";

/// Describes how to bootstrap one external tool.
///
/// Templates may reference `{name}`, `{version}`, `{os}`, `{arch}` and
/// `{exe}` (the platform's executable suffix).
///
/// ```toml
/// [tools.specs.node]
/// executable = "bin/node"
/// strip_components = 1
///
/// [tools.specs.node.archives]
/// linux-x86_64 = "https://nodejs.org/dist/v{version}/node-v{version}-linux-x64.tar.gz"
/// darwin-arm64 = "https://nodejs.org/dist/v{version}/node-v{version}-darwin-arm64.tar.gz"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSpec {
    /// Executable location relative to the tool home.
    pub executable: String,
    /// Leading path components dropped from every archive entry.
    pub strip_components: usize,
    /// Archive URL template per platform key (`linux-x86_64`, `default`, ...).
    pub archives: BTreeMap<String, String>,
    /// Expected SHA-256 of the archive per platform key.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sha256: BTreeMap<String, String>,
}

impl Default for ToolSpec {
    fn default() -> Self {
        Self {
            executable: "bin/{name}{exe}".to_string(),
            strip_components: 0,
            archives: BTreeMap::new(),
            sha256: BTreeMap::new(),
        }
    }
}

impl ToolSpec {
    /// Spec with a single archive template used on every platform.
    #[must_use]
    pub fn with_default_archive(template: impl Into<String>) -> Self {
        let mut spec = Self::default();
        spec.archives
            .insert(DEFAULT_ARCHIVE_KEY.to_string(), template.into());
        spec
    }

    /// Add an archive template for one platform.
    #[must_use]
    pub fn with_archive(mut self, platform: &Platform, template: impl Into<String>) -> Self {
        self.archives.insert(platform.key(), template.into());
        self
    }

    /// Set the executable template.
    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Set the number of leading components to strip.
    #[must_use]
    pub fn with_strip_components(mut self, count: usize) -> Self {
        self.strip_components = count;
        self
    }

    /// Archive URL for a tool version on a platform.
    pub fn archive_url(&self, name: &str, version: &str, platform: &Platform) -> Result<String> {
        let template = self
            .archives
            .get(&platform.key())
            .or_else(|| self.archives.get(DEFAULT_ARCHIVE_KEY))
            .ok_or_else(|| {
                Error::install_failure(
                    name,
                    version,
                    format!("no archive configured for platform {platform}"),
                )
            })?;
        Ok(expand_template(template, name, version, platform))
    }

    /// Expected archive digest for a platform, if pinned.
    #[must_use]
    pub fn expected_sha256(&self, platform: &Platform) -> Option<&str> {
        self.sha256
            .get(&platform.key())
            .or_else(|| self.sha256.get(DEFAULT_ARCHIVE_KEY))
            .map(String::as_str)
    }

    /// Executable path relative to the tool home.
    #[must_use]
    pub fn executable_path(&self, name: &str, version: &str, platform: &Platform) -> PathBuf {
        PathBuf::from(expand_template(&self.executable, name, version, platform))
    }
}

/// Expand template variables in a string.
#[must_use]
pub fn expand_template(template: &str, name: &str, version: &str, platform: &Platform) -> String {
    template
        .replace("{name}", name)
        .replace("{version}", version)
        .replace("{os}", platform.os.as_str())
        .replace("{arch}", platform.arch.as_str())
        .replace("{exe}", platform.os.executable_suffix())
}
