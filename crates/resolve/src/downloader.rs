//! Breadth-first acquisition of a coordinate set and its transitive closure.
//!
//! Each expansion level is acquired concurrently under a semaphore. Results are
//! folded back in level order, so the resolution set (and therefore conflict
//! precedence) is deterministic regardless of which worker finishes first.
//! The first failing coordinate cancels its siblings and aborts the request.

use depot_core::{
    ArtifactKind, Coordinate, DepotConfig, Descriptor, Error, LocalCache, RecoveryPolicy,
    RecoveryRule, Result,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fallback::{Attempt, FallbackError, first_success};
use crate::repository::{Repository, repositories_from_config};
use crate::resolver::{DescriptorResolver, unreachable_repositories};
use crate::set::{Admission, Conflict, ResolutionSet};

/// Tuning knobs for a [`Downloader`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOptions {
    /// Maximum number of coordinates acquired at once.
    pub parallelism: usize,
    /// Re-acquire entries that are already cached.
    pub force: bool,
    /// Bounds for re-acquiring an entry that is still incomplete.
    pub policy: RecoveryPolicy,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            parallelism: 8,
            force: false,
            policy: RecoveryPolicy::default(),
        }
    }
}

impl ResolveOptions {
    /// Options taken from the `[resolve]` and `[retry]` tables.
    #[must_use]
    pub fn from_config(config: &DepotConfig) -> Self {
        Self {
            parallelism: config.resolve.parallelism,
            force: config.resolve.force,
            policy: config.retry.clone(),
        }
    }
}

/// One cached artifact of a [`Resolution`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
    /// The artifact.
    pub coordinate: Coordinate,
    /// Cached binary.
    pub binary_path: PathBuf,
    /// Cached descriptor.
    pub descriptor_path: PathBuf,
    /// Whether the entry was already cached and no repository was contacted.
    pub from_cache: bool,
    /// Repository that served the entry during this request.
    pub repository: Option<String>,
}

/// Result of a successful resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Every resolved artifact, requested ones first, then breadth-first.
    pub artifacts: Vec<ResolvedArtifact>,
    /// Versions dropped in favour of the first one seen.
    pub conflicts: Vec<Conflict>,
}

impl Resolution {
    /// Cached binaries in resolution order (a classpath).
    pub fn binary_paths(&self) -> impl Iterator<Item = &Path> {
        self.artifacts.iter().map(|a| a.binary_path.as_path())
    }

    /// The resolved artifact for `coordinate`, if it is part of the closure.
    #[must_use]
    pub fn get(&self, coordinate: &Coordinate) -> Option<&ResolvedArtifact> {
        self.artifacts.iter().find(|a| &a.coordinate == coordinate)
    }

    /// Number of artifacts fetched from a repository during this request.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.artifacts.iter().filter(|a| !a.from_cache).count()
    }
}

/// Resolves coordinates into the local cache from an ordered repository chain.
#[derive(Clone)]
pub struct Downloader {
    cache: LocalCache,
    repositories: Arc<[Arc<dyn Repository>]>,
    options: ResolveOptions,
}

impl Downloader {
    /// Create a downloader over `cache` and `repositories` (in fallback order).
    #[must_use]
    pub fn new(
        cache: LocalCache,
        repositories: Vec<Arc<dyn Repository>>,
        options: ResolveOptions,
    ) -> Self {
        Self {
            cache,
            repositories: repositories.into(),
            options,
        }
    }

    /// Build a downloader from a loaded configuration.
    pub fn from_config(config: &DepotConfig) -> Result<Self> {
        Ok(Self::new(
            config.local_cache()?,
            repositories_from_config(&config.repositories)?,
            ResolveOptions::from_config(config),
        ))
    }

    /// The cache artifacts are resolved into.
    #[must_use]
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// A descriptor resolver sharing this downloader's cache and repositories.
    #[must_use]
    pub fn descriptor_resolver(&self) -> DescriptorResolver {
        DescriptorResolver::new(self.cache.clone(), self.repositories.clone())
    }

    /// Resolve `requested` and its transitive closure.
    pub async fn resolve(&self, requested: &[Coordinate]) -> Result<Resolution> {
        self.resolve_with_cancellation(requested, CancellationToken::new())
            .await
    }

    /// Resolve `requested`, aborting with [`Error::Cancelled`] once `cancel` fires.
    pub async fn resolve_with_cancellation(
        &self,
        requested: &[Coordinate],
        cancel: CancellationToken,
    ) -> Result<Resolution> {
        let set = ResolutionSet::new();
        let mut level: Vec<Coordinate> = requested
            .iter()
            .filter(|c| admit(&set, c))
            .cloned()
            .collect();

        info!(
            requested = requested.len(),
            repositories = self.repositories.len(),
            "Resolving artifacts"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.parallelism.max(1)));
        let mut artifacts = Vec::new();
        let mut depth = 0usize;

        while !level.is_empty() {
            if cancel.is_cancelled() {
                return Err(Error::cancelled("resolve"));
            }
            debug!(depth, coordinates = level.len(), "Acquiring level");

            let acquired = self.acquire_level(&level, &semaphore, &cancel).await?;
            let mut next = Vec::new();
            for Acquired {
                artifact,
                descriptor,
            } in acquired
            {
                next.extend(
                    descriptor
                        .transitive_dependencies()
                        .filter(|dep| admit(&set, dep))
                        .cloned(),
                );
                artifacts.push(artifact);
            }

            level = next;
            depth += 1;
        }

        let (_, conflicts) = set.into_parts();
        let resolution = Resolution {
            artifacts,
            conflicts,
        };
        info!(
            resolved = resolution.artifacts.len(),
            fetched = resolution.fetched(),
            conflicts = resolution.conflicts.len(),
            "Resolution complete"
        );
        Ok(resolution)
    }

    /// Acquire one level concurrently, returning results in level order.
    async fn acquire_level(
        &self,
        level: &[Coordinate],
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Acquired>> {
        let level_cancel = cancel.child_token();
        let mut join_set = JoinSet::new();

        for (index, coordinate) in level.iter().cloned().enumerate() {
            let acquirer = Acquirer {
                cache: self.cache.clone(),
                repositories: self.repositories.clone(),
                policy: self.options.policy.clone(),
                force: self.options.force,
                cancel: level_cancel.clone(),
            };
            let semaphore = Arc::clone(semaphore);

            join_set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => acquirer.acquire(&coordinate).await,
                    Err(_) => Err(Error::cancelled(format!("acquire {coordinate}"))),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Acquired>> = (0..level.len()).map(|_| None).collect();
        let mut failures: Vec<(usize, Error)> = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            let (index, outcome) = match joined {
                Ok(result) => result,
                Err(e) => (
                    usize::MAX,
                    Err(Error::io_no_path(
                        std::io::Error::other(e.to_string()),
                        "join acquisition task",
                    )),
                ),
            };

            match outcome {
                Ok(acquired) => slots[index] = Some(acquired),
                Err(error) => {
                    if failures.is_empty() && !error.is_cancelled() {
                        warn!(error = %error, "Acquisition failed, cancelling siblings");
                        level_cancel.cancel();
                    }
                    failures.push((index, error));
                }
            }
        }

        if !failures.is_empty() {
            return Err(first_failure(failures, cancel));
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("cache", &self.cache)
            .field(
                "repositories",
                &self.repositories.iter().map(|r| r.id()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish()
    }
}

fn admit(set: &ResolutionSet, coordinate: &Coordinate) -> bool {
    match set.admit(coordinate) {
        Admission::Inserted(_) => true,
        Admission::Duplicate(_) => false,
        Admission::Conflict(conflict) => {
            debug!(
                kept = %conflict.kept,
                discarded = %conflict.discarded,
                "Version conflict, keeping first seen"
            );
            false
        }
    }
}

/// The error to report for a failed level: the earliest coordinate in level
/// order that failed for a reason other than sibling cancellation.
fn first_failure(mut failures: Vec<(usize, Error)>, cancel: &CancellationToken) -> Error {
    if cancel.is_cancelled() {
        return Error::cancelled("resolve");
    }
    failures.sort_by_key(|(index, _)| *index);
    let position = failures
        .iter()
        .position(|(_, e)| !e.is_cancelled())
        .unwrap_or(0);
    failures.swap_remove(position).1
}

struct Acquired {
    artifact: ResolvedArtifact,
    descriptor: Descriptor,
}

/// Where a repository stopped serving a coordinate's pair of files.
#[derive(Debug)]
struct PairFailure {
    stage: ArtifactKind,
    error: Error,
}

impl PairFailure {
    fn at(stage: ArtifactKind) -> impl FnOnce(Error) -> Self {
        move |error| Self { stage, error }
    }
}

/// Per-coordinate acquisition state moved into a worker task.
#[derive(Clone)]
struct Acquirer {
    cache: LocalCache,
    repositories: Arc<[Arc<dyn Repository>]>,
    policy: RecoveryPolicy,
    force: bool,
    cancel: CancellationToken,
}

impl Acquirer {
    fn resolver(&self) -> DescriptorResolver {
        DescriptorResolver::new(self.cache.clone(), self.repositories.clone())
    }

    async fn acquire(&self, coordinate: &Coordinate) -> Result<Acquired> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(format!("acquire {coordinate}")));
        }

        if !self.force
            && self.cache.entry_state(coordinate).is_complete()
            && let Some(descriptor) = self.resolver().cached(coordinate)?
        {
            debug!(%coordinate, "Served from cache");
            return Ok(Acquired {
                artifact: self.artifact(coordinate, true, None),
                descriptor,
            });
        }

        let served_cell: Mutex<Option<String>> = Mutex::new(None);
        let refreshed_flag = AtomicBool::new(!self.force);
        let served_by = &served_cell;
        let refreshed = &refreshed_flag;

        RecoveryRule::new(
            format!("acquire {coordinate}"),
            || self.cache.entry_state(coordinate),
            |state: &depot_core::EntryState| {
                state.is_complete() && refreshed.load(Ordering::SeqCst)
            },
            move || async move {
                let repository = self.fetch_pair(coordinate).await?;
                if let Ok(mut slot) = served_by.lock() {
                    *slot = Some(repository);
                }
                refreshed.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .with_policy(self.policy.clone())
        .with_cancellation(self.cancel.clone())
        .apply()
        .await?;

        let descriptor = self.resolver().cached(coordinate)?.ok_or_else(|| {
            Error::corrupt_descriptor(coordinate, "descriptor vanished from the cache")
        })?;
        let repository = served_cell.into_inner().ok().flatten();
        let from_cache = repository.is_none();

        Ok(Acquired {
            artifact: self.artifact(coordinate, from_cache, repository),
            descriptor,
        })
    }

    /// Fetch descriptor then binary, trying repositories in order.
    async fn fetch_pair(&self, coordinate: &Coordinate) -> Result<String> {
        let mut attempts: Vec<Attempt<'_, String, PairFailure>> =
            Vec::with_capacity(self.repositories.len());
        for repo in self.repositories.iter() {
            attempts.push(Box::pin(self.fetch_pair_from(repo.as_ref(), coordinate)));
        }

        match first_success(attempts, |f: &PairFailure| f.error.permits_fallback()).await {
            Ok(repository) => Ok(repository),
            Err(FallbackError::Fatal { error, .. }) => Err(error.error),
            Err(FallbackError::Exhausted(failures)) => {
                let unreachable = unreachable_repositories(failures.iter().map(|f| &f.error));
                let coordinate = coordinate.clone();
                if failures.iter().any(|f| f.stage == ArtifactKind::Binary) {
                    Err(Error::BinaryNotFound {
                        coordinate,
                        unreachable,
                    })
                } else {
                    Err(Error::ArtifactNotFound {
                        coordinate,
                        unreachable,
                    })
                }
            }
        }
    }

    async fn fetch_pair_from(
        &self,
        repository: &dyn Repository,
        coordinate: &Coordinate,
    ) -> std::result::Result<String, PairFailure> {
        let (_, descriptor) = self
            .resolver()
            .fetch_from(repository, coordinate)
            .await
            .map_err(PairFailure::at(ArtifactKind::Descriptor))?;

        let binary = repository
            .fetch(&coordinate.binary_url_path())
            .await
            .map_err(PairFailure::at(ArtifactKind::Binary))?;

        // Binary first: a visible descriptor alone never counts as present
        let store = || -> Result<()> {
            let staged_binary = self.cache.stage(coordinate, ArtifactKind::Binary, &binary)?;
            let staged_descriptor =
                self.cache
                    .stage(coordinate, ArtifactKind::Descriptor, &descriptor)?;
            staged_binary.commit()?;
            staged_descriptor.commit()?;
            Ok(())
        };
        store().map_err(PairFailure::at(ArtifactKind::Binary))?;

        info!(
            %coordinate,
            repository = repository.id(),
            bytes = binary.len(),
            "Acquired artifact"
        );
        Ok(repository.id().to_string())
    }

    fn artifact(
        &self,
        coordinate: &Coordinate,
        from_cache: bool,
        repository: Option<String>,
    ) -> ResolvedArtifact {
        ResolvedArtifact {
            coordinate: coordinate.clone(),
            binary_path: self.cache.locate(coordinate),
            descriptor_path: self.cache.locate_descriptor(coordinate),
            from_cache,
            repository,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_failure_prefers_level_order() {
        let failures = vec![
            (2, Error::not_found("r", "c")),
            (0, Error::cancelled("acquire g:a:1")),
            (1, Error::configuration("broken")),
        ];
        let err = first_failure(failures, &CancellationToken::new());
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_first_failure_reports_outer_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let err = first_failure(vec![(0, Error::configuration("x"))], &token);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_resolution_accessors() {
        let a = ResolvedArtifact {
            coordinate: coord("g:a:1"),
            binary_path: PathBuf::from("/c/g/a/1/a-1.jar"),
            descriptor_path: PathBuf::from("/c/g/a/1/a-1.json"),
            from_cache: true,
            repository: None,
        };
        let b = ResolvedArtifact {
            coordinate: coord("g:b:1"),
            binary_path: PathBuf::from("/c/g/b/1/b-1.jar"),
            descriptor_path: PathBuf::from("/c/g/b/1/b-1.json"),
            from_cache: false,
            repository: Some("central".into()),
        };
        let resolution = Resolution {
            artifacts: vec![a, b],
            conflicts: vec![],
        };

        assert_eq!(resolution.fetched(), 1);
        assert_eq!(
            resolution.binary_paths().collect::<Vec<_>>(),
            vec![Path::new("/c/g/a/1/a-1.jar"), Path::new("/c/g/b/1/b-1.jar")]
        );
        assert_eq!(
            resolution.get(&coord("g:b:1")).and_then(|a| a.repository.as_deref()),
            Some("central")
        );
        assert!(resolution.get(&coord("g:c:1")).is_none());
    }

    #[test]
    fn test_options_from_config() {
        let config = DepotConfig::from_toml(
            "[resolve]\nparallelism = 2\nforce = true\n[retry]\nmax_attempts = 5\n",
        )
        .unwrap();
        let options = ResolveOptions::from_config(&config);
        assert_eq!(options.parallelism, 2);
        assert!(options.force);
        assert_eq!(options.policy.max_attempts, 5);
    }
}
