//! Workflow engine errors.

use std::error::Error as _;
use std::time::Duration;

use clipflow_common::ClipflowError;
use clipflow_edl::EdlError;
use clipflow_render_engine::RenderFailure;
use clipflow_render_queue::QueueError;
use clipflow_services::{sanitize_provider_error, ProviderError, StorageError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Problems with the shape of a workflow graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("workflow graph is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown step category {0:?}")]
    UnknownCategory(String),

    #[error("duplicate step id {0:?}")]
    DuplicateStep(String),

    #[error("edge {from} -> {to} references unknown step {missing:?}")]
    UnknownStep {
        from: String,
        to: String,
        missing: String,
    },

    #[error("workflow graph has a cycle through steps {}", .steps.join(", "))]
    Cycle { steps: Vec<String> },
}

/// Why one step failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid step configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("operation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Edl(#[from] EdlError),

    #[error(transparent)]
    Render(#[from] RenderFailure),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("auto-edit failed: {0}")]
    AutoEdit(#[from] clipflow_auto_edit::BuildError),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

/// Uniform failure shape recorded on a step log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    /// Message safe to show a user.
    pub error: String,
    /// Full error chain for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
}

impl StepFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_stack: None,
        }
    }
}

impl From<&StepError> for StepFailure {
    fn from(err: &StepError) -> Self {
        let mut stack = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            error: sanitize_provider_error(&err.to_string()),
            error_stack: Some(stack),
        }
    }
}

impl From<StepError> for StepFailure {
    fn from(err: StepError) -> Self {
        Self::from(&err)
    }
}

/// Engine-level failures: the run could not be driven at all.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("run store error: {0}")]
    Storage(#[from] StorageError),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("no review session for run {run_id} step {step_id:?}")]
    ReviewNotFound { run_id: Uuid, step_id: String },

    #[error("review session {0} is already resolved")]
    ReviewResolved(Uuid),

    #[error("run {0} is not paused for review")]
    NotPaused(Uuid),

    #[error("review resolution rejected: {0}")]
    Resolution(#[from] StepError),

    #[error("run task failed: {0}")]
    Task(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for ClipflowError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Graph(e) => ClipflowError::validation(e.to_string()),
            EngineError::Storage(e) => e.into(),
            other => ClipflowError::workflow(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_hides_provider_internals() {
        let err = StepError::Provider(ProviderError::RateLimited("quota for org-42".into()));
        let failure = StepFailure::from(&err);
        assert!(!failure.error.contains("org-42"));
        assert!(failure.error_stack.unwrap().contains("org-42"));
    }

    #[test]
    fn test_cycle_message_names_steps() {
        let err = GraphError::Cycle {
            steps: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "workflow graph has a cycle through steps a, b");
    }
}
