//! Where tool archives are downloaded from.

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{Error, Result};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// Downloads a whole archive by URL.
///
/// Failures follow the repository convention: [`Error::NotFound`] when the
/// archive does not exist, [`Error::Unreachable`] when the host could not be
/// asked. Only the latter is retried by the bootstrapper.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Fetch the archive at `url`.
    async fn download(&self, url: &str) -> Result<Bytes>;
}

/// Downloads archives over HTTP(S); `file://` URLs are read from disk.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    client: Client,
}

impl HttpArchiveSource {
    /// Default per-download timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Create a source with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("depot/{}", depot_core::VERSION))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn download(&self, url: &str) -> Result<Bytes> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::configuration(format!("invalid archive URL '{url}': {e}")))?;
        let host = parsed.host_str().unwrap_or("local").to_string();

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|()| Error::configuration(format!("invalid file URL '{url}'")))?;
            return match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(Error::not_found(host, url))
                }
                Err(e) => Err(Error::io(e, path, "read archive")),
            };
        }

        debug!(%url, "Downloading archive");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| Error::unreachable(&host, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(Error::not_found(host, url));
        }
        if !status.is_success() {
            return Err(Error::unreachable(host, format!("HTTP {status} for {url}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::unreachable(host, format!("failed to read archive: {e}")))
    }
}
