//! Asset fetching.
//!
//! EDLs reference media by URL. A reference may be the blob store's native
//! `blob://` scheme, a presigned `http(s)://` URL, a `file://` URL or a plain
//! filesystem path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::blob::{key_from_blob_url, BlobStore, BLOB_SCHEME};
use crate::error::{StorageError, StorageResult};

/// Resolves an asset reference to its bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> StorageResult<Bytes>;
}

/// Fetcher backed by a blob store plus HTTP and local-disk access.
pub struct StoreAssetFetcher {
    store: Arc<dyn BlobStore>,
    http: reqwest::Client,
    timeout: Duration,
}

impl StoreAssetFetcher {
    pub fn new(store: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            timeout,
        }
    }

    async fn fetch_http(&self, url: &str) -> StorageResult<Bytes> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorageError::fetch(url, format!("timed out after {:?}", self.timeout))
                } else {
                    StorageError::fetch(url, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::fetch(url, format!("HTTP {status}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| StorageError::fetch(url, e.to_string()))
    }
}

#[async_trait]
impl AssetFetcher for StoreAssetFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> StorageResult<Bytes> {
        let url = url.trim();
        if url.starts_with(BLOB_SCHEME) {
            let key = key_from_blob_url(url)
                .ok_or_else(|| StorageError::UnsupportedUrl(url.to_string()))?;
            return self.store.get(key).await;
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_http(url).await;
        }

        let path = match url.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None if url.contains("://") || url.is_empty() => {
                return Err(StorageError::UnsupportedUrl(url.to_string()));
            }
            None => PathBuf::from(url),
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;

    fn fetcher(store: Arc<InMemoryBlobStore>) -> StoreAssetFetcher {
        StoreAssetFetcher::new(store, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_fetch_blob_scheme() {
        let store = Arc::new(InMemoryBlobStore::new());
        store
            .put("user-assets/u/clip.mp4", Bytes::from_static(b"mp4"), "video/mp4")
            .await
            .unwrap();
        let fetcher = fetcher(store);
        assert_eq!(fetcher.fetch("blob://user-assets/u/clip.mp4").await.unwrap(), "mp4");
        assert_eq!(
            fetcher
                .fetch("blob://user-assets/u/clip.mp4?expires=99")
                .await
                .unwrap(),
            "mp4"
        );
    }

    #[tokio::test]
    async fn test_fetch_local_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"local").unwrap();

        let fetcher = fetcher(Arc::new(InMemoryBlobStore::new()));
        assert_eq!(fetcher.fetch(path.to_str().unwrap()).await.unwrap(), "local");
        let file_url = format!("file://{}", path.display());
        assert_eq!(fetcher.fetch(&file_url).await.unwrap(), "local");
    }

    #[tokio::test]
    async fn test_unsupported_and_missing() {
        let fetcher = fetcher(Arc::new(InMemoryBlobStore::new()));
        assert!(matches!(
            fetcher.fetch("ftp://host/a.mp4").await,
            Err(StorageError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            fetcher.fetch("blob://user-assets/none.mp4").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
