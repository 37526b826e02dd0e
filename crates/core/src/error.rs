//! Error types shared by every depot crate.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

use crate::coordinate::Coordinate;

/// Error type for artifact resolution and tool bootstrap operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A coordinate was malformed (empty or unsafe field).
    #[error("Invalid coordinate '{input}': {reason}")]
    #[diagnostic(
        code(depot::coordinate::invalid),
        help("Coordinates are written as group:name:version")
    )]
    InvalidCoordinate {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A repository does not hold the requested path.
    #[error("'{path}' not found in repository '{repository}'")]
    #[diagnostic(code(depot::repository::not_found))]
    NotFound {
        /// Repository identifier.
        repository: String,
        /// Relative path that was requested.
        path: String,
    },

    /// A repository could not be contacted.
    #[error("Repository '{repository}' is unreachable: {message}")]
    #[diagnostic(code(depot::repository::unreachable))]
    Unreachable {
        /// Repository identifier.
        repository: String,
        /// Transport error description.
        message: String,
    },

    /// No repository serves the artifact's descriptor.
    #[error("Artifact {coordinate} not found in any repository")]
    #[diagnostic(
        code(depot::resolve::artifact_not_found),
        help("Check the coordinate spelling and the configured repositories")
    )]
    ArtifactNotFound {
        /// The unresolvable coordinate.
        coordinate: Coordinate,
        /// Repositories that could not be contacted while searching.
        unreachable: Vec<String>,
    },

    /// A descriptor was found but no repository serves the binary.
    #[error("Binary for {coordinate} not found in any repository (descriptor exists)")]
    #[diagnostic(code(depot::resolve::binary_not_found))]
    BinaryNotFound {
        /// The coordinate whose binary is missing.
        coordinate: Coordinate,
        /// Repositories that could not be contacted while searching.
        unreachable: Vec<String>,
    },

    /// A descriptor could not be parsed or does not describe its coordinate.
    #[error("Corrupt descriptor for {coordinate}: {message}")]
    #[diagnostic(code(depot::descriptor::corrupt))]
    CorruptDescriptor {
        /// The coordinate the descriptor belongs to.
        coordinate: Coordinate,
        /// Parse or consistency failure.
        message: String,
    },

    /// A tool archive could not be fetched or unpacked.
    #[error("Failed to install {tool} {version}: {message}")]
    #[diagnostic(code(depot::tools::install_failure))]
    InstallFailure {
        /// Tool name.
        tool: String,
        /// Requested version.
        version: String,
        /// Failure description.
        message: String,
    },

    /// A recovery loop reached its bound without the constraint holding.
    #[error("{operation} did not succeed after {attempts} attempts: {last_error}")]
    #[diagnostic(
        code(depot::recovery::exhausted),
        help("Raise retry.max_attempts or check repository availability")
    )]
    RetryExhausted {
        /// The guarded operation.
        operation: String,
        /// Number of recovery attempts made.
        attempts: u32,
        /// Description of the last failure observed.
        last_error: String,
    },

    /// The operation was cancelled through its cancellation token.
    #[error("{operation} was cancelled")]
    #[diagnostic(code(depot::cancelled))]
    Cancelled {
        /// The cancelled operation.
        operation: String,
    },

    /// I/O error with path context.
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(depot::io),
        help("Check file permissions and available disk space")
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available.
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "rename").
        operation: String,
    },

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(depot::config))]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },
}

impl Error {
    /// Create an invalid coordinate error.
    #[must_use]
    pub fn invalid_coordinate(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCoordinate {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(repository: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            repository: repository.into(),
            path: path.into(),
        }
    }

    /// Create an unreachable repository error.
    #[must_use]
    pub fn unreachable(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            repository: repository.into(),
            message: message.into(),
        }
    }

    /// Create a corrupt descriptor error.
    #[must_use]
    pub fn corrupt_descriptor(coordinate: &Coordinate, message: impl Into<String>) -> Self {
        Self::CorruptDescriptor {
            coordinate: coordinate.clone(),
            message: message.into(),
        }
    }

    /// Create an install failure error.
    #[must_use]
    pub fn install_failure(
        tool: impl Into<String>,
        version: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InstallFailure {
            tool: tool.into(),
            version: version.into(),
            message: message.into(),
        }
    }

    /// Create a retry exhausted error.
    #[must_use]
    pub fn retry_exhausted(
        operation: impl Into<String>,
        attempts: u32,
        last_error: impl Into<String>,
    ) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a cancellation error.
    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an I/O error with path context.
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context.
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Whether the next repository in a fallback chain should be consulted.
    #[must_use]
    pub fn permits_fallback(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Unreachable { .. })
    }

    /// Whether repeating the operation later could succeed.
    ///
    /// Exhaustion errors are only transient when some repository could not be
    /// contacted; a plain "absent everywhere" answer is final.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::ArtifactNotFound { unreachable, .. }
            | Self::BinaryNotFound { unreachable, .. } => !unreachable.is_empty(),
            _ => false,
        }
    }

    /// Whether this error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type for depot operations.
pub type Result<T> = std::result::Result<T, Error>;
