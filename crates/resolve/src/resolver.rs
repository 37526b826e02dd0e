//! Descriptor lookup and parsing.

use bytes::Bytes;
use depot_core::{ArtifactKind, Coordinate, Descriptor, Error, LocalCache, Result};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::fallback::{Attempt, FallbackError, first_success};
use crate::repository::Repository;

/// Obtains the descriptor of a coordinate from the cache or the repository chain.
///
/// Descriptors share the binaries' acquisition policy: cache first, then the
/// repositories in order, first one serving the file wins.
#[derive(Clone)]
pub struct DescriptorResolver {
    cache: LocalCache,
    repositories: Arc<[Arc<dyn Repository>]>,
}

impl DescriptorResolver {
    /// Create a resolver over `cache` and an ordered repository chain.
    #[must_use]
    pub fn new(cache: LocalCache, repositories: Arc<[Arc<dyn Repository>]>) -> Self {
        Self {
            cache,
            repositories,
        }
    }

    /// The cache descriptors are read from and written to.
    #[must_use]
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Parse the cached descriptor of `coordinate`, if there is one.
    pub fn cached(&self, coordinate: &Coordinate) -> Result<Option<Descriptor>> {
        self.cache
            .read_descriptor(coordinate)?
            .map(|bytes| Descriptor::parse(coordinate, &bytes))
            .transpose()
    }

    /// Fetch and parse the descriptor from a single repository.
    ///
    /// The raw bytes are returned alongside so callers can cache them verbatim.
    pub async fn fetch_from(
        &self,
        repository: &dyn Repository,
        coordinate: &Coordinate,
    ) -> Result<(Descriptor, Bytes)> {
        let bytes = repository.fetch(&coordinate.descriptor_url_path()).await?;
        let descriptor = Descriptor::parse(coordinate, &bytes)?;
        trace!(
            %coordinate,
            repository = repository.id(),
            dependencies = descriptor.dependencies.len(),
            "Parsed descriptor"
        );
        Ok((descriptor, bytes))
    }

    /// Resolve the descriptor of `coordinate`.
    ///
    /// A descriptor that fails to parse is fatal for the coordinate even if a
    /// later repository might serve a valid one.
    pub async fn resolve(&self, coordinate: &Coordinate) -> Result<Descriptor> {
        if let Some(descriptor) = self.cached(coordinate)? {
            debug!(%coordinate, "Descriptor served from cache");
            return Ok(descriptor);
        }

        let mut attempts: Vec<Attempt<'_, (Descriptor, Bytes), Error>> =
            Vec::with_capacity(self.repositories.len());
        for repo in self.repositories.iter() {
            attempts.push(Box::pin(self.fetch_from(repo.as_ref(), coordinate)));
        }

        match first_success(attempts, Error::permits_fallback).await {
            Ok((descriptor, bytes)) => {
                self.cache
                    .store(coordinate, ArtifactKind::Descriptor, &bytes)?;
                Ok(descriptor)
            }
            Err(FallbackError::Fatal { error, .. }) => Err(error),
            Err(FallbackError::Exhausted(failures)) => Err(Error::ArtifactNotFound {
                coordinate: coordinate.clone(),
                unreachable: unreachable_repositories(&failures),
            }),
        }
    }
}

impl std::fmt::Debug for DescriptorResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorResolver")
            .field("cache", &self.cache)
            .field(
                "repositories",
                &self.repositories.iter().map(|r| r.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Identifiers of repositories that reported [`Error::Unreachable`].
pub(crate) fn unreachable_repositories<'a>(
    failures: impl IntoIterator<Item = &'a Error>,
) -> Vec<String> {
    failures
        .into_iter()
        .filter_map(|e| match e {
            Error::Unreachable { repository, .. } => Some(repository.clone()),
            _ => None,
        })
        .collect()
}
