//! Runs and their per-step logs.
//!
//! The run record is what pollers read: it is saved after every step
//! transition and only the scheduler writes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StepFailure;
use crate::graph::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    /// Waiting on a review gate.
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Idle,
    Running,
    Success,
    Error,
    WaitingReview,
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLog {
    pub step_id: String,
    pub step_type: String,
    pub title: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Inputs as the step received them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
}

impl StepLog {
    fn idle(step: &Step) -> Self {
        Self {
            step_id: step.id.clone(),
            step_type: step.qualified_type(),
            title: step.display_title().to_string(),
            status: StepStatus::Idle,
            started_at: None,
            completed_at: None,
            input: None,
            output: None,
            error: None,
            error_stack: None,
        }
    }
}

/// One execution of a workflow graph. Serialises as the poll response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(rename = "runId")]
    pub id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    /// One log per scheduled step, in execution order.
    pub steps: Vec<StepLog>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Run {
    /// A running run with an idle log for every step in `order`.
    pub fn new(workflow_id: impl Into<String>, order: &[&Step]) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            status: RunStatus::Running,
            steps: order.iter().map(|s| StepLog::idle(s)).collect(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn log(&self, step_id: &str) -> Option<&StepLog> {
        self.steps.iter().find(|l| l.step_id == step_id)
    }

    fn log_mut(&mut self, step_id: &str) -> Option<&mut StepLog> {
        self.steps.iter_mut().find(|l| l.step_id == step_id)
    }

    /// Output recorded by a successful step.
    pub fn output_of(&self, step_id: &str) -> Option<&Value> {
        self.log(step_id)
            .filter(|l| l.status == StepStatus::Success)
            .and_then(|l| l.output.as_ref())
    }

    /// The step currently waiting on review, if any.
    pub fn waiting_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|l| l.status == StepStatus::WaitingReview)
            .map(|l| l.step_id.as_str())
    }

    pub fn mark_running(&mut self, step_id: &str, input: Value, at: DateTime<Utc>) {
        if let Some(log) = self.log_mut(step_id) {
            log.status = StepStatus::Running;
            log.started_at = Some(at);
            log.input = Some(input);
        }
    }

    pub fn mark_success(&mut self, step_id: &str, output: Value, at: DateTime<Utc>) {
        if let Some(log) = self.log_mut(step_id) {
            log.status = StepStatus::Success;
            log.completed_at = Some(at);
            log.output = Some(output);
        }
    }

    pub fn mark_error(&mut self, step_id: &str, failure: &StepFailure, at: DateTime<Utc>) {
        if let Some(log) = self.log_mut(step_id) {
            log.status = StepStatus::Error;
            log.completed_at = Some(at);
            log.error = Some(failure.error.clone());
            log.error_stack = failure.error_stack.clone();
        }
        self.status = RunStatus::Failed;
        self.error = Some(failure.error.clone());
        self.completed_at = Some(at);
    }

    /// Suspend on a review gate. The gate's provisional output is kept on the log.
    pub fn mark_waiting(&mut self, step_id: &str, output: Value) {
        if let Some(log) = self.log_mut(step_id) {
            log.status = StepStatus::WaitingReview;
            log.output = Some(output);
        }
        self.status = RunStatus::Paused;
    }

    pub fn resume(&mut self) {
        self.status = RunStatus::Running;
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(at);
    }

    /// Fail the run without blaming a step.
    pub fn abort(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(at);
    }
}
