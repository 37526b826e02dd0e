//! End-to-end resolution against in-process repositories.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{
    Coordinate, Dependency, Descriptor, Error, LocalCache, RecoveryPolicy, Result, Scope,
};
use depot_resolve::{Downloader, FileRepository, Repository, ResolveOptions};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Wraps a directory repository and counts every request it receives.
struct CountingRepository {
    inner: FileRepository,
    requests: AtomicUsize,
    served: AtomicUsize,
}

impl CountingRepository {
    fn new(id: &str, root: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: FileRepository::new(id, root),
            requests: AtomicUsize::new(0),
            served: AtomicUsize::new(0),
        })
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for CountingRepository {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn fetch(&self, relative_path: &str) -> Result<Bytes> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.fetch(relative_path).await;
        if result.is_ok() {
            self.served.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

/// A repository whose host never answers.
struct DeadRepository {
    requests: AtomicUsize,
}

#[async_trait]
impl Repository for DeadRepository {
    fn id(&self) -> &str {
        "dead"
    }

    async fn fetch(&self, _relative_path: &str) -> Result<Bytes> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Err(Error::unreachable("dead", "connection refused"))
    }
}

/// A repository whose requests never complete.
struct HangingRepository;

#[async_trait]
impl Repository for HangingRepository {
    fn id(&self) -> &str {
        "hanging"
    }

    async fn fetch(&self, _relative_path: &str) -> Result<Bytes> {
        std::future::pending::<()>().await;
        Err(Error::unreachable("hanging", "unreachable"))
    }
}

fn coord(s: &str) -> Coordinate {
    s.parse().unwrap()
}

fn dep(s: &str) -> Dependency {
    scoped(s, Scope::Compile)
}

fn scoped(s: &str, scope: Scope) -> Dependency {
    Dependency {
        coordinate: coord(s),
        scope,
        optional: false,
    }
}

fn publish_descriptor(root: &Path, c: &Coordinate, dependencies: Vec<Dependency>) {
    let path = root.join(c.descriptor_path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let json = Descriptor::new(c.clone(), dependencies).to_json().unwrap();
    std::fs::write(path, json).unwrap();
}

fn publish_binary(root: &Path, c: &Coordinate) {
    let path = root.join(c.binary_path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("binary of {c}")).unwrap();
}

fn publish(root: &Path, s: &str, dependencies: Vec<Dependency>) -> Coordinate {
    let c = coord(s);
    publish_descriptor(root, &c, dependencies);
    publish_binary(root, &c);
    c
}

fn downloader(cache: &TempDir, repositories: Vec<Arc<dyn Repository>>) -> Downloader {
    downloader_with(cache, repositories, ResolveOptions::default())
}

fn downloader_with(
    cache: &TempDir,
    repositories: Vec<Arc<dyn Repository>>,
    options: ResolveOptions,
) -> Downloader {
    Downloader::new(LocalCache::new(cache.path()), repositories, options)
}

fn fast_options() -> ResolveOptions {
    ResolveOptions {
        policy: RecoveryPolicy::immediate(2),
        ..ResolveOptions::default()
    }
}

#[tokio::test]
async fn test_warm_cache_makes_no_requests() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "org.example:a:1.0", vec![dep("org.example:b:1.0")]);
    let b = publish(remote.path(), "org.example:b:1.0", vec![]);

    let repo = CountingRepository::new("central", remote.path());
    let downloader = downloader(&cache, vec![repo.clone()]);

    let first = downloader.resolve(&[a.clone()]).await.unwrap();
    assert_eq!(first.fetched(), 2);
    let cold_requests = repo.requests();
    assert_eq!(cold_requests, 4);

    let second = downloader.resolve(&[a.clone()]).await.unwrap();
    assert_eq!(repo.requests(), cold_requests);
    assert_eq!(second.fetched(), 0);
    assert!(second.artifacts.iter().all(|art| art.from_cache));
    assert!(downloader.cache().is_present(&b));
}

#[tokio::test]
async fn test_resolution_runs_on_spawned_task() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "g:a:1", vec![dep("g:b:1")]);
    publish(remote.path(), "g:b:1", vec![]);

    let downloader = downloader(&cache, vec![CountingRepository::new("central", remote.path())]);
    let requested = vec![a];
    let resolution = tokio::spawn(async move { downloader.resolve(&requested).await })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolution.artifacts.len(), 2);
    assert!(resolution.artifacts.iter().all(|art| art.binary_path.is_file()));
}

#[tokio::test]
async fn test_falls_back_to_next_repository() {
    let empty = TempDir::new().unwrap();
    let mirror = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(mirror.path(), "g:a:1", vec![]);

    let r1 = CountingRepository::new("r1", empty.path());
    let r2 = CountingRepository::new("r2", mirror.path());
    let resolution = downloader(&cache, vec![r1.clone(), r2.clone()])
        .resolve(&[a.clone()])
        .await
        .unwrap();

    let artifact = resolution.get(&a).unwrap();
    assert_eq!(artifact.repository.as_deref(), Some("r2"));
    assert!(!artifact.from_cache);
    assert_eq!(r1.served(), 0);
    assert_eq!(r2.served(), 2);
    assert!(artifact.binary_path.is_file());
}

#[tokio::test]
async fn test_first_serving_repository_wins() {
    let one = TempDir::new().unwrap();
    let two = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(one.path(), "g:a:1", vec![]);
    publish(two.path(), "g:a:1", vec![]);

    let r1 = CountingRepository::new("r1", one.path());
    let r2 = CountingRepository::new("r2", two.path());
    downloader(&cache, vec![r1.clone(), r2.clone()])
        .resolve(&[a])
        .await
        .unwrap();

    assert_eq!(r1.served(), 2);
    assert_eq!(r2.requests(), 0);
}

#[tokio::test]
async fn test_unreachable_repository_is_skipped() {
    let mirror = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(mirror.path(), "g:a:1", vec![]);

    let dead = Arc::new(DeadRepository {
        requests: AtomicUsize::new(0),
    });
    let resolution = downloader(
        &cache,
        vec![dead.clone(), CountingRepository::new("mirror", mirror.path())],
    )
    .resolve(&[a.clone()])
    .await
    .unwrap();

    assert_eq!(resolution.get(&a).unwrap().repository.as_deref(), Some("mirror"));
    assert_eq!(dead.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_unreachable_is_bounded() {
    let cache = TempDir::new().unwrap();
    let dead = Arc::new(DeadRepository {
        requests: AtomicUsize::new(0),
    });

    let err = downloader_with(&cache, vec![dead.clone()], fast_options())
        .resolve(&[coord("g:a:1")])
        .await
        .unwrap_err();

    match err {
        Error::RetryExhausted {
            operation,
            attempts,
            last_error,
        } => {
            assert_eq!(operation, "acquire g:a:1");
            assert_eq!(attempts, 2);
            assert!(last_error.contains("g:a:1"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(dead.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transitive_closure_is_cached() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "g:a:1", vec![dep("g:b:1")]);
    let b = publish(remote.path(), "g:b:1", vec![dep("g:c:1")]);
    let c = publish(remote.path(), "g:c:1", vec![]);

    let d = downloader(&cache, vec![CountingRepository::new("central", remote.path())]);
    let resolution = d.resolve(&[a.clone()]).await.unwrap();

    let order: Vec<_> = resolution.artifacts.iter().map(|x| x.coordinate.clone()).collect();
    assert_eq!(order, vec![a.clone(), b.clone(), c.clone()]);
    for coordinate in [&a, &b, &c] {
        assert!(d.cache().is_present(coordinate), "{coordinate} not cached");
    }
}

#[tokio::test]
async fn test_shared_dependency_resolved_once() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "g:a:1", vec![dep("g:shared:1")]);
    let b = publish(remote.path(), "g:b:1", vec![dep("g:shared:1")]);
    publish(remote.path(), "g:shared:1", vec![]);

    let repo = CountingRepository::new("central", remote.path());
    let resolution = downloader(&cache, vec![repo.clone()])
        .resolve(&[a, b])
        .await
        .unwrap();

    assert_eq!(resolution.artifacts.len(), 3);
    assert_eq!(repo.requests(), 6);
    assert!(resolution.conflicts.is_empty());
}

#[tokio::test]
async fn test_first_requested_version_wins() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let v1 = publish(remote.path(), "g:a:1.0", vec![]);
    let v2 = publish(remote.path(), "g:a:2.0", vec![]);

    let d = downloader(&cache, vec![CountingRepository::new("central", remote.path())]);
    let resolution = d.resolve(&[v1.clone(), v2.clone()]).await.unwrap();

    assert_eq!(resolution.artifacts.len(), 1);
    assert!(resolution.get(&v1).is_some());
    assert!(resolution.get(&v2).is_none());
    assert_eq!(resolution.conflicts.len(), 1);
    assert_eq!(resolution.conflicts[0].kept, v1);
    assert_eq!(resolution.conflicts[0].discarded, v2);
    assert!(d.cache().is_absent(&v2));
}

#[tokio::test]
async fn test_nearest_version_wins_across_levels() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    // app -> lib:1 -> util:1, app -> util:2; util:2 is nearer
    let app = publish(remote.path(), "g:app:1", vec![dep("g:lib:1"), dep("g:util:2")]);
    publish(remote.path(), "g:lib:1", vec![dep("g:util:1")]);
    publish(remote.path(), "g:util:1", vec![]);
    let util2 = publish(remote.path(), "g:util:2", vec![]);

    let resolution = downloader(&cache, vec![CountingRepository::new("central", remote.path())])
        .resolve(&[app])
        .await
        .unwrap();

    assert!(resolution.get(&util2).is_some());
    assert!(resolution.get(&coord("g:util:1")).is_none());
    assert_eq!(resolution.conflicts[0].kept, util2);
}

#[tokio::test]
async fn test_non_propagating_scopes_are_not_expanded() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let mut optional = dep("g:opt:1");
    optional.optional = true;
    let a = publish(
        remote.path(),
        "g:a:1",
        vec![
            scoped("g:junit:5", Scope::Test),
            scoped("g:servlet:3", Scope::Provided),
            scoped("g:rt:1", Scope::Runtime),
            optional,
        ],
    );
    let rt = publish(remote.path(), "g:rt:1", vec![]);

    let resolution = downloader(&cache, vec![CountingRepository::new("central", remote.path())])
        .resolve(&[a.clone()])
        .await
        .unwrap();

    let resolved: Vec<_> = resolution.artifacts.iter().map(|x| x.coordinate.clone()).collect();
    assert_eq!(resolved, vec![a, rt]);
}

#[tokio::test]
async fn test_missing_everywhere_names_coordinate() {
    let one = TempDir::new().unwrap();
    let two = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let missing = coord("org.example:missing:1.0");

    let d = downloader(
        &cache,
        vec![
            CountingRepository::new("r1", one.path()),
            CountingRepository::new("r2", two.path()),
        ],
    );
    let err = d.resolve(&[missing.clone()]).await.unwrap_err();

    match err {
        Error::ArtifactNotFound {
            coordinate,
            unreachable,
        } => {
            assert_eq!(coordinate, missing);
            assert!(unreachable.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(d.cache().is_absent(&missing));
    assert!(!d.cache().locate(&missing).parent().unwrap().exists());
}

#[tokio::test]
async fn test_missing_transitive_dependency_fails_request() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "g:a:1", vec![dep("g:gone:1")]);

    let err = downloader(&cache, vec![CountingRepository::new("central", remote.path())])
        .resolve(&[a])
        .await
        .unwrap_err();

    assert!(
        matches!(&err, Error::ArtifactNotFound { coordinate, .. } if *coordinate == coord("g:gone:1")),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_descriptor_without_binary() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = coord("g:a:1");
    publish_descriptor(remote.path(), &a, vec![]);

    let d = downloader(&cache, vec![CountingRepository::new("central", remote.path())]);
    let err = d.resolve(&[a.clone()]).await.unwrap_err();

    assert!(matches!(err, Error::BinaryNotFound { ref coordinate, .. } if *coordinate == a));
    assert!(!d.cache().locate_descriptor(&a).exists());
}

#[tokio::test]
async fn test_corrupt_descriptor_is_fatal() {
    let bad = TempDir::new().unwrap();
    let good = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = coord("g:a:1");
    let path = bad.path().join(a.descriptor_path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();
    publish_binary(bad.path(), &a);
    publish(good.path(), "g:a:1", vec![]);

    let good_repo = CountingRepository::new("good", good.path());
    let err = downloader(
        &cache,
        vec![CountingRepository::new("bad", bad.path()), good_repo.clone()],
    )
    .resolve(&[a])
    .await
    .unwrap_err();

    assert!(matches!(err, Error::CorruptDescriptor { .. }));
    assert_eq!(good_repo.requests(), 0);
}

#[tokio::test]
async fn test_force_refetches_cached_entries() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "g:a:1", vec![]);
    let repo = CountingRepository::new("central", remote.path());

    downloader(&cache, vec![repo.clone()])
        .resolve(&[a.clone()])
        .await
        .unwrap();
    assert_eq!(repo.requests(), 2);

    let forced = ResolveOptions {
        force: true,
        ..ResolveOptions::default()
    };
    let resolution = downloader_with(&cache, vec![repo.clone()], forced)
        .resolve(&[a.clone()])
        .await
        .unwrap();

    assert_eq!(repo.requests(), 4);
    assert!(!resolution.get(&a).unwrap().from_cache);
}

#[tokio::test]
async fn test_partial_cache_entry_is_completed() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "g:a:1", vec![]);

    // Descriptor cached by an earlier descriptor-only lookup, binary missing
    let d = downloader(&cache, vec![CountingRepository::new("central", remote.path())]);
    d.descriptor_resolver().resolve(&a).await.unwrap();
    assert!(d.cache().is_absent(&a));

    let resolution = d.resolve(&[a.clone()]).await.unwrap();
    assert!(!resolution.get(&a).unwrap().from_cache);
    assert!(d.cache().is_present(&a));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let a = publish(remote.path(), "g:a:1", vec![]);
    let repo = CountingRepository::new("central", remote.path());

    let token = CancellationToken::new();
    token.cancel();
    let err = downloader(&cache, vec![repo.clone()])
        .resolve_with_cancellation(&[a], token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(repo.requests(), 0);
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_fetch() {
    let cache = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        downloader(&cache, vec![Arc::new(HangingRepository)])
            .resolve_with_cancellation(&[coord("g:a:1")], token),
    )
    .await
    .expect("resolution should stop once cancelled");

    assert!(result.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_parallel_level_with_single_worker() {
    let remote = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let deps: Vec<_> = (0..6)
        .map(|i| {
            publish(remote.path(), &format!("g:leaf{i}:1"), vec![]);
            dep(&format!("g:leaf{i}:1"))
        })
        .collect();
    let root = publish(remote.path(), "g:root:1", deps);

    let serial = ResolveOptions {
        parallelism: 1,
        ..ResolveOptions::default()
    };
    let resolution = downloader_with(
        &cache,
        vec![CountingRepository::new("central", remote.path())],
        serial,
    )
    .resolve(&[root])
    .await
    .unwrap();

    let names: Vec<_> = resolution
        .artifacts
        .iter()
        .map(|a| a.coordinate.name().to_string())
        .collect();
    assert_eq!(names, ["root", "leaf0", "leaf1", "leaf2", "leaf3", "leaf4", "leaf5"]);
}
