//! Error types shared across Clipflow crates.

/// Top-level error type for Clipflow operations.
///
/// Crate-specific errors convert into this at API boundaries.
#[derive(Debug, thiserror::Error)]
pub enum ClipflowError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Queue error: {message}")]
    Queue { message: String },

    #[error("Workflow error: {message}")]
    Workflow { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias using ClipflowError.
pub type ClipflowResult<T> = Result<T, ClipflowError>;

impl ClipflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue {
            message: msg.into(),
        }
    }

    pub fn workflow(msg: impl Into<String>) -> Self {
        Self::Workflow {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
