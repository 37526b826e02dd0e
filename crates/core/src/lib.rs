//! Core types for depot artifact acquisition.
//!
//! This crate holds the pieces every other depot crate builds on:
//! - [`Coordinate`] - artifact identity and the cache layout derived from it
//! - [`LocalCache`] - the on-disk, cache-first artifact store
//! - [`Descriptor`] - parsed dependency metadata
//! - [`RecoveryRule`] - bounded retry-until-satisfied primitive
//! - [`tools`] - platform and tool specification types
//! - [`DepotConfig`] - `depot.toml` configuration

pub mod cache;
pub mod config;
pub mod coordinate;
pub mod descriptor;
mod error;
pub mod paths;
pub mod recovery;
pub mod tools;

pub use cache::{ArtifactKind, EntryState, LocalCache, StagedFile};
pub use config::{DepotConfig, RepositoryConfig};
pub use coordinate::Coordinate;
pub use descriptor::{Dependency, Descriptor, Scope};
pub use error::{Error, Result};
pub use recovery::{RecoveryPolicy, RecoveryRule};

/// depot version, embedded in HTTP user agents.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
