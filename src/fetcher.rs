//! Resource fetchers: how the synchronizer reads a published repository.
//!
//! The updater only knows resource names (`index-manifest.json`, snapshot
//! and chunk names from the manifest). A [`ResourceFetcher`] turns a name
//! into bytes, emitting [`TransferEvent`]s along the way.
//!
//! | Fetcher | URL forms | Notes |
//! |---------|-----------|-------|
//! | [`HttpFetcher`] | `http://`, `https://` | streamed, retries transient failures |
//! | [`DirectoryFetcher`] | `file://…`, plain path | local mirror, used by tests and `aidx pack` output |
//!
//! Failures are reported as [`IndexError::Fetch`] with a
//! [`FetchErrorKind`]: `404`/missing file is `NotFound`, `401`/`403` is
//! `Unauthorized`, everything else (5xx, connection resets, timeouts) is
//! `Transient`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use artifact_index_core::manifest::check_resource_name;
use artifact_index_core::{FetchErrorKind, IndexError};

use crate::progress::{NoProgress, SharedListener, TransferEvent};

/// Fetches named resources of a published index.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Human-readable location, for logs and `aidx status`.
    fn describe(&self) -> String;

    async fn fetch(&self, resource: &str) -> Result<Vec<u8>, IndexError>;
}

/// Fetches over HTTP(S) with reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    listener: SharedListener,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(base_url: &str, timeout: Duration, listener: SharedListener) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            listener,
            max_retries: 2,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn url_for(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    async fn fetch_once(&self, resource: &str) -> Result<Vec<u8>, IndexError> {
        let url = self.url_for(resource);
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IndexError::fetch(resource, FetchErrorKind::Transient, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let kind = match status.as_u16() {
                404 | 410 => FetchErrorKind::NotFound,
                401 | 403 => FetchErrorKind::Unauthorized,
                _ => FetchErrorKind::Transient,
            };
            return Err(IndexError::fetch(resource, kind, format!("HTTP {} from {}", status, url)));
        }

        let total = response.content_length();
        self.listener.on_event(&TransferEvent::Started {
            resource: resource.to_string(),
            total,
        });

        let mut body = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| IndexError::fetch(resource, FetchErrorKind::Transient, e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            self.listener.on_event(&TransferEvent::Progress {
                resource: resource.to_string(),
                received: body.len() as u64,
                total,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    async fn fetch(&self, resource: &str) -> Result<Vec<u8>, IndexError> {
        check_resource_name(resource)?;
        let mut attempt = 0;
        loop {
            match self.fetch_once(resource).await {
                Ok(body) => {
                    self.listener.on_event(&TransferEvent::Completed {
                        resource: resource.to_string(),
                        bytes: body.len() as u64,
                    });
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    // Exponential backoff: 1s, 2s, 4s, ...
                    let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                    debug!("retrying {} in {:?}: {}", resource, delay, e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.listener.on_event(&TransferEvent::Failed {
                        resource: resource.to_string(),
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
    }
}

/// Reads resources from a local directory laid out like the remote.
pub struct DirectoryFetcher {
    root: PathBuf,
    listener: SharedListener,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listener: std::sync::Arc::new(NoProgress),
        }
    }

    pub fn with_listener(mut self, listener: SharedListener) -> Self {
        self.listener = listener;
        self
    }
}

#[async_trait]
impl ResourceFetcher for DirectoryFetcher {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn fetch(&self, resource: &str) -> Result<Vec<u8>, IndexError> {
        check_resource_name(resource)?;
        let path = self.root.join(resource);
        self.listener.on_event(&TransferEvent::Started {
            resource: resource.to_string(),
            total: None,
        });
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                self.listener.on_event(&TransferEvent::Completed {
                    resource: resource.to_string(),
                    bytes: bytes.len() as u64,
                });
                Ok(bytes)
            }
            Err(e) => {
                let kind = match e.kind() {
                    std::io::ErrorKind::NotFound => FetchErrorKind::NotFound,
                    std::io::ErrorKind::PermissionDenied => FetchErrorKind::Unauthorized,
                    _ => FetchErrorKind::Transient,
                };
                let err = IndexError::fetch(resource, kind, format!("{}: {}", path.display(), e));
                self.listener.on_event(&TransferEvent::Failed {
                    resource: resource.to_string(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

/// Pick a fetcher for a repository URL.
pub fn fetcher_for_url(
    url: &str,
    request_timeout: Duration,
    listener: SharedListener,
) -> Result<Box<dyn ResourceFetcher>, IndexError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Box::new(HttpFetcher::new(url, request_timeout, listener)?));
    }
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Box::new(DirectoryFetcher::new(path).with_listener(listener)));
    }
    if url.contains("://") {
        return Err(IndexError::Config(format!(
            "unsupported repository URL scheme: '{}'",
            url
        )));
    }
    Ok(Box::new(DirectoryFetcher::new(url).with_listener(listener)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TransferEvent>>);

    impl crate::progress::TransferListener for Recorder {
        fn on_event(&self, event: &TransferEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test]
    async fn directory_fetch_reads_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index-manifest.json"), b"{}").unwrap();
        let recorder = Arc::new(Recorder::default());
        let fetcher = DirectoryFetcher::new(dir.path()).with_listener(recorder.clone());

        let bytes = fetcher.fetch("index-manifest.json").await.unwrap();
        assert_eq!(bytes, b"{}");
        let events = recorder.0.lock().unwrap();
        assert!(matches!(events.last(), Some(TransferEvent::Completed { bytes: 2, .. })));
    }

    #[tokio::test]
    async fn directory_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryFetcher::new(dir.path())
            .fetch("missing.json")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::Fetch {
                kind: FetchErrorKind::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryFetcher::new(dir.path())
            .fetch("../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Format { .. }));
    }

    #[test]
    fn url_dispatch() {
        let listener: SharedListener = Arc::new(NoProgress);
        let timeout = Duration::from_secs(5);
        let http = fetcher_for_url("https://repo.example.org/index/", timeout, listener.clone()).unwrap();
        assert_eq!(http.describe(), "https://repo.example.org/index");
        let file = fetcher_for_url("file:///srv/index", timeout, listener.clone()).unwrap();
        assert_eq!(file.describe(), "file:///srv/index");
        assert!(fetcher_for_url("ftp://x", timeout, listener).is_err());
    }
}
