//! Artifact descriptors.
//!
//! A descriptor sits next to an artifact's binary and declares the artifact's
//! own coordinate plus its direct dependencies:
//!
//! ```json
//! {
//!   "group": "org.example",
//!   "name": "app",
//!   "version": "1.0",
//!   "dependencies": [
//!     { "group": "org.example", "name": "lib", "version": "2.1" },
//!     { "group": "org.junit", "name": "junit", "version": "5.0", "scope": "test" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::{Error, Result};

/// Scope of a declared dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Needed to compile and run; propagates to consumers.
    #[default]
    Compile,
    /// Needed at runtime only; propagates to consumers.
    Runtime,
    /// Supplied by the environment; does not propagate.
    Provided,
    /// Needed by the artifact's own tests; does not propagate.
    Test,
}

impl Scope {
    /// Whether dependencies in this scope reach downstream consumers.
    #[must_use]
    pub fn propagates(self) -> bool {
        matches!(self, Self::Compile | Self::Runtime)
    }
}

/// A dependency declared by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The dependency's coordinate.
    pub coordinate: Coordinate,
    /// Declared scope.
    pub scope: Scope,
    /// Optional dependencies are not pulled in transitively.
    pub optional: bool,
}

impl Dependency {
    /// Whether resolving the declaring artifact must also resolve this one.
    #[must_use]
    pub fn is_transitive(&self) -> bool {
        self.scope.propagates() && !self.optional
    }
}

/// Parsed descriptor document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// The artifact this descriptor describes.
    pub coordinate: Coordinate,
    /// Direct dependencies in declaration order.
    pub dependencies: Vec<Dependency>,
}

impl Descriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(coordinate: Coordinate, dependencies: Vec<Dependency>) -> Self {
        Self {
            coordinate,
            dependencies,
        }
    }

    /// Parse a descriptor fetched for `expected`.
    ///
    /// Any syntax error, malformed dependency coordinate, or mismatch between
    /// the declared and expected coordinate is reported as
    /// [`Error::CorruptDescriptor`]; dependencies are never skipped silently.
    pub fn parse(expected: &Coordinate, bytes: &[u8]) -> Result<Self> {
        let raw: RawDescriptor = serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupt_descriptor(expected, e.to_string()))?;

        let declared = Coordinate::new(raw.group, raw.name, raw.version)
            .map_err(|e| Error::corrupt_descriptor(expected, e.to_string()))?;
        if &declared != expected {
            return Err(Error::corrupt_descriptor(
                expected,
                format!("descriptor declares {declared}"),
            ));
        }

        let mut dependencies = Vec::with_capacity(raw.dependencies.len());
        for (index, dep) in raw.dependencies.into_iter().enumerate() {
            let coordinate = Coordinate::new(dep.group, dep.name, dep.version).map_err(|e| {
                Error::corrupt_descriptor(expected, format!("dependency #{index}: {e}"))
            })?;
            dependencies.push(Dependency {
                coordinate,
                scope: dep.scope,
                optional: dep.optional,
            });
        }

        Ok(Self {
            coordinate: declared,
            dependencies,
        })
    }

    /// Serialize to the JSON document form.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let raw = RawDescriptor {
            group: self.coordinate.group().to_string(),
            name: self.coordinate.name().to_string(),
            version: self.coordinate.version().to_string(),
            dependencies: self
                .dependencies
                .iter()
                .map(|d| RawDependency {
                    group: d.coordinate.group().to_string(),
                    name: d.coordinate.name().to_string(),
                    version: d.coordinate.version().to_string(),
                    scope: d.scope,
                    optional: d.optional,
                })
                .collect(),
        };
        serde_json::to_vec_pretty(&raw)
            .map_err(|e| Error::corrupt_descriptor(&self.coordinate, e.to_string()))
    }

    /// Dependencies that propagate to consumers of this artifact.
    pub fn transitive_dependencies(&self) -> impl Iterator<Item = &Coordinate> {
        self.dependencies
            .iter()
            .filter(|d| d.is_transitive())
            .map(|d| &d.coordinate)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDescriptor {
    group: String,
    name: String,
    version: String,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDependency {
    group: String,
    name: String,
    version: String,
    #[serde(default)]
    scope: Scope,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    optional: bool,
}
