//! Artifact resolution for depot.
//!
//! Given requested [`Coordinate`]s and an ordered chain of [`Repository`]s,
//! the [`Downloader`] populates a [`LocalCache`] with the requested artifacts
//! and their transitive closure:
//!
//! 1. A coordinate whose descriptor and binary are both cached is resolved
//!    without touching the network.
//! 2. Otherwise repositories are tried in order; the first one serving both
//!    the descriptor and the binary wins.
//! 3. The descriptor's propagating dependencies are admitted to the
//!    [`ResolutionSet`] (first version seen wins) and expanded next.
//!
//! A single unresolvable coordinate fails the whole request.
//!
//! ```no_run
//! # async fn run() -> depot_core::Result<()> {
//! use depot_core::LocalCache;
//! use depot_resolve::{FileRepository, Repository};
//! use std::sync::Arc;
//!
//! let repos: Vec<Arc<dyn Repository>> = vec![Arc::new(FileRepository::new("mirror", "/srv/mirror"))];
//! let resolution = depot_resolve::resolve(
//!     LocalCache::new("/tmp/depot"),
//!     repos,
//!     &["org.example:lib:1.0".parse()?],
//! )
//! .await?;
//! for path in resolution.binary_paths() {
//!     println!("{}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod downloader;
pub mod fallback;
pub mod repository;
pub mod resolver;
pub mod set;

pub use downloader::{Downloader, Resolution, ResolveOptions, ResolvedArtifact};
pub use fallback::{Attempt, FallbackError, first_success};
pub use repository::{
    FileRepository, HttpRepository, Repository, repositories_from_config, repository_from_config,
};
pub use resolver::DescriptorResolver;
pub use set::{Admission, Conflict, ResolutionSet};

use depot_core::{Coordinate, LocalCache, Result};
use std::sync::Arc;

/// Resolve `coordinates` into `cache` with default options.
pub async fn resolve(
    cache: LocalCache,
    repositories: Vec<Arc<dyn Repository>>,
    coordinates: &[Coordinate],
) -> Result<Resolution> {
    Downloader::new(cache, repositories, ResolveOptions::default())
        .resolve(coordinates)
        .await
}
