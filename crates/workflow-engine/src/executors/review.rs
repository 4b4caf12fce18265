//! Approval gate.
//!
//! In `manual_review` mode the gate records a pending [`ReviewSession`] and
//! pauses the run. The engine finishes the gate once the session is resolved,
//! building the final output with [`resolved_gate_output`].

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Map, Value};

use super::{config_f64, config_str, lookup_str, merged_input, pass_through, ExecutorServices};
use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;
use crate::graph::{ReviewKind, StepKind};
use crate::review::ReviewSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewMode {
    AutoApprove,
    #[default]
    ManualReview,
}

impl FromStr for ReviewMode {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto_approve" | "auto" => Ok(Self::AutoApprove),
            "manual_review" | "manual" => Ok(Self::ManualReview),
            other => Err(StepError::InvalidConfig(format!("unknown review mode '{other}'"))),
        }
    }
}

/// Gate output once approved: upstream fields plus the approved EDL.
pub fn resolved_gate_output(upstream: &Value, approved_edl_url: Option<&str>, decision: &str) -> Value {
    let mut output = match upstream {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    output.remove("reviewId");
    output.insert("status".into(), json!("approved"));
    output.insert("decision".into(), json!(decision));
    if let Some(url) = approved_edl_url {
        output.insert("edlUrl".into(), json!(url));
        output.insert("approvedEdlUrl".into(), json!(url));
    }
    Value::Object(output)
}

pub struct ReviewExecutor {
    services: Arc<ExecutorServices>,
}

impl ReviewExecutor {
    pub fn new(services: Arc<ExecutorServices>) -> Self {
        Self { services }
    }

    async fn approval_gate(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let mode = config_str(ctx, "mode")
            .map(str::parse::<ReviewMode>)
            .transpose()?
            .unwrap_or_default();
        let upstream = Value::Object(merged_input(ctx));
        let edl_url = lookup_str(ctx, "edlUrl");

        match mode {
            ReviewMode::AutoApprove => {
                tracing::info!(step = %ctx.step_id, "Review auto-approved");
                Ok(StepOutcome::Completed(resolved_gate_output(
                    &upstream,
                    edl_url,
                    "auto_approve",
                )))
            }
            ReviewMode::ManualReview => {
                let mut session = ReviewSession::pending(ctx.run_id, ctx.step_id.clone());
                session.project_id = lookup_str(ctx, "projectId").and_then(|id| id.parse().ok());
                session.edl_url = edl_url.map(str::to_string);
                session.expires_at = config_f64(ctx, "timeoutSec")
                    .filter(|secs| *secs > 0.0)
                    .map(|secs| Utc::now() + ChronoDuration::milliseconds((secs * 1000.0) as i64));

                let session = self.services.reviews.upsert(session).await?;
                tracing::info!(
                    step = %ctx.step_id,
                    review_id = %session.id,
                    run_id = %ctx.run_id,
                    "Waiting for review"
                );

                let mut output = match upstream {
                    Value::Object(fields) => fields,
                    _ => Map::new(),
                };
                output.insert("reviewId".into(), json!(session.id));
                output.insert("status".into(), json!("pending"));
                output.insert("expiresAt".into(), json!(session.expires_at));
                Ok(StepOutcome::Paused {
                    review_id: session.id,
                    output: Value::Object(output),
                })
            }
        }
    }
}

#[async_trait]
impl StepExecutor for ReviewExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match ctx.kind {
            StepKind::Review(ReviewKind::ApprovalGate) => self.approval_gate(ctx).await,
            _ => Ok(StepOutcome::Completed(pass_through(ctx))),
        }
    }
}
