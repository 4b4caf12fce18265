//! Blob storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;

/// Native URL scheme of the blob store.
pub const BLOB_SCHEME: &str = "blob://";

/// Where a blob landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
}

/// Key → bytes store with presigned retrieval.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<StoredBlob>;

    /// Read a blob.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// A time-limited URL clients can read the blob from.
    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Remove a blob. Removing a missing blob is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// `blob://{key}`
pub fn blob_url(key: &str) -> String {
    format!("{BLOB_SCHEME}{key}")
}

/// Extract the key from a `blob://` URL, dropping any query string.
pub fn key_from_blob_url(url: &str) -> Option<&str> {
    let rest = url.strip_prefix(BLOB_SCHEME)?;
    let key = rest.split_once('?').map_or(rest, |(key, _)| key);
    (!key.is_empty()).then_some(key)
}

fn presigned_url(key: &str, ttl: Duration) -> String {
    let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
    format!("{}?expires={expires}", blob_url(key))
}

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
}

/// Process-local blob store. Used in tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, MemoryObject>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for `key`, if stored.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// Every stored key with the given prefix, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<StoredBlob> {
        validate_key(key)?;
        let size = data.len();
        self.objects.write().await.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        tracing::debug!(key, size_bytes = size, "Stored blob in memory");
        Ok(StoredBlob {
            key: key.to_string(),
            url: blob_url(key),
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        if !self.objects.read().await.contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(presigned_url(key, ttl))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }
}

/// Filesystem-backed blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::Backend(format!(
                "Failed to create storage directory {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<StoredBlob> {
        let path = self.key_to_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let start = std::time::Instant::now();
        tokio::fs::write(&path, &data).await?;

        tracing::info!(
            path = %path.display(),
            key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local blob write successful"
        );

        Ok(StoredBlob {
            key: key.to_string(),
            url: blob_url(key),
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let path = self.key_to_path(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(presigned_url(key, ttl))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_url_round_trip() {
        assert_eq!(blob_url("a/b.mp4"), "blob://a/b.mp4");
        assert_eq!(key_from_blob_url("blob://a/b.mp4"), Some("a/b.mp4"));
        assert_eq!(key_from_blob_url("blob://a/b.mp4?expires=10"), Some("a/b.mp4"));
        assert_eq!(key_from_blob_url("blob://"), None);
        assert_eq!(key_from_blob_url("https://x/y"), None);
    }

    #[tokio::test]
    async fn test_memory_store_put_get_delete() {
        let store = InMemoryBlobStore::new();
        let stored = store
            .put("user-assets/u1/a.txt", Bytes::from_static(b"hi"), "text/plain")
            .await
            .unwrap();
        assert_eq!(stored.url, "blob://user-assets/u1/a.txt");
        assert_eq!(store.get("user-assets/u1/a.txt").await.unwrap(), "hi");
        assert_eq!(
            store.content_type("user-assets/u1/a.txt").await.as_deref(),
            Some("text/plain")
        );

        let url = store
            .presign("user-assets/u1/a.txt", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("blob://user-assets/u1/a.txt?expires="));

        store.delete("user-assets/u1/a.txt").await.unwrap();
        assert!(matches!(
            store.get("user-assets/u1/a.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_traversal() {
        let store = InMemoryBlobStore::new();
        let result = store
            .put("../escape", Bytes::from_static(b"x"), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs")).await.unwrap();

        store
            .put("video-assets/u/p/edl.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert!(dir.path().join("blobs/video-assets/u/p/edl.json").exists());
        assert_eq!(store.get("video-assets/u/p/edl.json").await.unwrap(), "{}");
        assert!(store
            .presign("video-assets/u/p/edl.json", Duration::from_secs(5))
            .await
            .is_ok());
        assert!(matches!(
            store.presign("video-assets/u/p/missing", Duration::from_secs(5)).await,
            Err(StorageError::NotFound(_))
        ));

        store.delete("video-assets/u/p/edl.json").await.unwrap();
        store.delete("video-assets/u/p/edl.json").await.unwrap();
    }
}
