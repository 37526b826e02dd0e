//! Remote artifact sources.
//!
//! A repository serves bytes for a relative path below its base location.
//! Two outcomes other than success are distinguished:
//! - [`Error::NotFound`] - the repository answered, the path is absent
//! - [`Error::Unreachable`] - the repository could not be asked
//!
//! Both let the caller move on to the next repository.

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{Error, RepositoryConfig, Result};
use reqwest::{Client, StatusCode, Url};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// An addressable source of artifact files.
///
/// Repositories are stateless and shared across concurrent acquisitions.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Identifier used in logs and error messages.
    fn id(&self) -> &str;

    /// Fetch the file at `relative_path` (always `/`-separated).
    async fn fetch(&self, relative_path: &str) -> Result<Bytes>;
}

/// Repository served over HTTP(S) by plain GET requests.
#[derive(Debug, Clone)]
pub struct HttpRepository {
    id: String,
    base: Url,
    client: Client,
}

impl HttpRepository {
    /// Create a repository rooted at `base_url`.
    pub fn new(id: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::configuration(format!("invalid repository URL '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(format!("depot/{}", depot_core::VERSION))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            id: id.into(),
            base,
            client,
        })
    }

    /// Base URL every relative path is appended to.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url_for(&self, relative_path: &str) -> Result<Url> {
        self.base
            .join(relative_path.trim_start_matches('/'))
            .map_err(|e| Error::configuration(format!("invalid path '{relative_path}': {e}")))
    }
}

#[async_trait]
impl Repository for HttpRepository {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, relative_path: &str) -> Result<Bytes> {
        let url = self.url_for(relative_path)?;
        debug!(repository = %self.id, %url, "Fetching");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::unreachable(&self.id, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(Error::not_found(&self.id, relative_path));
        }
        if !status.is_success() {
            return Err(Error::unreachable(&self.id, format!("HTTP {status} for {url}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::unreachable(&self.id, format!("failed to read body: {e}")))
    }
}

/// Repository backed by a local directory (mirrors, tests, `file://` URLs).
#[derive(Debug, Clone)]
pub struct FileRepository {
    id: String,
    root: PathBuf,
}

impl FileRepository {
    /// Create a repository rooted at `root`.
    #[must_use]
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    /// Directory holding the repository contents.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Repository for FileRepository {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, relative_path: &str) -> Result<Bytes> {
        let path = relative_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment));
        trace!(repository = %self.id, ?path, "Reading");

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(&self.id, relative_path))
            }
            Err(e) => Err(Error::unreachable(&self.id, format!("{}: {e}", path.display()))),
        }
    }
}

/// Build a repository from its configuration, choosing the transport by scheme.
pub fn repository_from_config(config: &RepositoryConfig) -> Result<Arc<dyn Repository>> {
    let url = config.url.as_str();
    if url.starts_with("http://") || url.starts_with("https://") {
        let repo = HttpRepository::new(config.id(), url, Duration::from_secs(config.timeout_secs))?;
        return Ok(Arc::new(repo));
    }

    let root = if url.starts_with("file://") {
        Url::parse(url)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| Error::configuration(format!("invalid file URL '{url}'")))?
    } else {
        PathBuf::from(url)
    };
    Ok(Arc::new(FileRepository::new(config.id(), root)))
}

/// Build the ordered repository chain from configuration.
pub fn repositories_from_config(configs: &[RepositoryConfig]) -> Result<Vec<Arc<dyn Repository>>> {
    configs.iter().map(repository_from_config).collect()
}
