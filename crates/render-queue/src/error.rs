//! Render queue errors.

use clipflow_common::ClipflowError;
use clipflow_edl::EdlError;
use clipflow_render_engine::RenderFailure;
use clipflow_services::StorageError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("unsupported broker URL {0:?} (only memory:// is built in)")]
    UnsupportedBroker(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("stored EDL is invalid: {0}")]
    Edl(#[from] EdlError),

    #[error("render failed: {0}")]
    Render(#[from] RenderFailure),

    #[error("render job {0} not found")]
    JobNotFound(Uuid),

    #[error("render queue is shut down")]
    Closed,
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<QueueError> for ClipflowError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Storage(e) => e.into(),
            QueueError::Edl(e) => ClipflowError::validation(e.to_string()),
            QueueError::Render(e) => ClipflowError::render(e.to_string()),
            QueueError::UnsupportedBroker(url) => {
                ClipflowError::config(format!("unsupported broker URL {url:?}"))
            }
            other => ClipflowError::queue(other.to_string()),
        }
    }
}
