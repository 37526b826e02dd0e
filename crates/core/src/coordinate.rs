//! Artifact coordinates and the cache layout derived from them.
//!
//! A coordinate is the `(group, name, version)` identity of an artifact. The
//! relative paths of its binary and descriptor are pure functions of the
//! triple:
//!
//! ```text
//! org.example:lib:1.2.0
//!   -> org/example/lib/1.2.0/lib-1.2.0.jar
//!   -> org/example/lib/1.2.0/lib-1.2.0.json
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// File extension of cached binaries.
pub const BINARY_EXTENSION: &str = "jar";

/// File extension of cached descriptors.
pub const DESCRIPTOR_EXTENSION: &str = "json";

/// Identity of an artifact.
///
/// Equality and ordering are lexicographic over `(group, name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate", into = "RawCoordinate")]
pub struct Coordinate {
    group: String,
    name: String,
    version: String,
}

/// The `(group, name)` part of a coordinate, used for conflict detection.
pub type ModuleKey = (String, String);

impl Coordinate {
    /// Create a coordinate, validating every field.
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let group = group.into();
        let name = name.into();
        let version = version.into();
        let display = format!("{group}:{name}:{version}");

        validate_field(&display, "group", &group)?;
        if group.split('.').any(str::is_empty) {
            return Err(Error::invalid_coordinate(
                display,
                "group must not contain empty segments",
            ));
        }
        validate_field(&display, "name", &name)?;
        validate_field(&display, "version", &version)?;

        Ok(Self {
            group,
            name,
            version,
        })
    }

    /// Group identifier (e.g., "org.example").
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Artifact name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The `(group, name)` key shared by every version of this artifact.
    #[must_use]
    pub fn module_key(&self) -> ModuleKey {
        (self.group.clone(), self.name.clone())
    }

    /// Directory holding this artifact's files, relative to a cache or repository root.
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        let mut dir: PathBuf = self.group.split('.').collect();
        dir.push(&self.name);
        dir.push(&self.version);
        dir
    }

    /// Relative path of the binary.
    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        self.directory().join(self.file_name(BINARY_EXTENSION))
    }

    /// Relative path of the descriptor.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.directory().join(self.file_name(DESCRIPTOR_EXTENSION))
    }

    /// Binary path as a `/`-separated string for remote lookups.
    #[must_use]
    pub fn binary_url_path(&self) -> String {
        self.url_path(BINARY_EXTENSION)
    }

    /// Descriptor path as a `/`-separated string for remote lookups.
    #[must_use]
    pub fn descriptor_url_path(&self) -> String {
        self.url_path(DESCRIPTOR_EXTENSION)
    }

    fn file_name(&self, extension: &str) -> String {
        format!("{}-{}.{}", self.name, self.version, extension)
    }

    fn url_path(&self, extension: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.name,
            self.version,
            self.file_name(extension)
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [group, name, version] => Self::new(*group, *name, *version),
            _ => Err(Error::invalid_coordinate(
                s,
                "expected exactly three ':'-separated fields",
            )),
        }
    }
}

fn validate_field(display: &str, field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_coordinate(
            display,
            format!("{field} must not be empty"),
        ));
    }
    if value == "." || value == ".." {
        return Err(Error::invalid_coordinate(
            display,
            format!("{field} must not be a relative path component"),
        ));
    }
    if value
        .chars()
        .any(|c| c == '/' || c == '\\' || c == ':' || c.is_whitespace() || c.is_control())
    {
        return Err(Error::invalid_coordinate(
            display,
            format!("{field} contains a path separator, ':' or whitespace"),
        ));
    }
    Ok(())
}

/// Unvalidated wire form of a coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCoordinate {
    group: String,
    name: String,
    version: String,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = Error;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Self::new(raw.group, raw.name, raw.version)
    }
}

impl From<Coordinate> for RawCoordinate {
    fn from(c: Coordinate) -> Self {
        Self {
            group: c.group,
            name: c.name,
            version: c.version,
        }
    }
}
