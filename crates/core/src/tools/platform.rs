//! Platform identification for tool archives.
//!
//! A platform is written as an `os-arch` key (`linux-x86_64`, `darwin-arm64`,
//! `windows-x86_64`). The same key selects an archive in a [`ToolSpec`].
//! Common aliases (`macos`, `amd64`, `aarch64`, ...) are accepted on input but
//! never produced.
//!
//! [`ToolSpec`]: super::ToolSpec

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Target of a tool installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

/// Operating system half of a platform key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// macOS.
    Darwin,
    /// Linux.
    Linux,
    /// Windows.
    Windows,
}

/// Architecture half of a platform key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit ARM.
    Arm64,
    /// 64-bit x86.
    X86_64,
}

impl Os {
    /// Canonical spelling used in platform keys and `{os}` templates.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    /// Suffix of executables on this OS.
    #[must_use]
    pub const fn executable_suffix(self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::Darwin | Self::Linux => "",
        }
    }
}

impl Arch {
    /// Canonical spelling used in platform keys and `{arch}` templates.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }
}

impl FromStr for Os {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "darwin" | "macos" | "osx" => Ok(Self::Darwin),
            "linux" => Ok(Self::Linux),
            "windows" | "win" => Ok(Self::Windows),
            other => Err(Error::configuration(format!(
                "unknown operating system '{other}' (expected darwin, linux or windows)"
            ))),
        }
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            other => Err(Error::configuration(format!(
                "unknown architecture '{other}' (expected arm64 or x86_64)"
            ))),
        }
    }
}

impl Platform {
    /// Platform from its two halves.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this process runs on.
    ///
    /// Fails on hosts no tool archive can target.
    pub fn current() -> Result<Self> {
        Ok(Self {
            os: std::env::consts::OS.parse()?,
            arch: std::env::consts::ARCH.parse()?,
        })
    }

    /// Archive key of this platform in a tool specification.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (os, arch) = s.split_once('-').ok_or_else(|| {
            Error::configuration(format!(
                "invalid platform '{s}' (expected os-arch, e.g. linux-x86_64)"
            ))
        })?;
        Ok(Self::new(os.parse()?, arch.parse()?))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}
