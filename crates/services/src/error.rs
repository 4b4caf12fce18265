//! Storage errors.

use clipflow_common::ClipflowError;

/// Storage and fetch failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Unsupported asset reference: {0}")]
    UnsupportedUrl(String),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }
}

impl From<StorageError> for ClipflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => ClipflowError::Io(e),
            other => ClipflowError::storage(other.to_string()),
        }
    }
}
