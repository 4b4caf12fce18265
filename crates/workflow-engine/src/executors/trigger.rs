use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;

/// Stamps the run start and exposes the payload the run was started with.
pub struct TriggerExecutor;

#[async_trait]
impl StepExecutor for TriggerExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::Completed(json!({
            "triggeredAt": Utc::now().to_rfc3339(),
            "triggerType": ctx.step_type,
            "userId": ctx.user_id,
            "payload": ctx.trigger_payload,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::test_support::context;
    use crate::graph::StepKind;

    #[tokio::test]
    async fn test_trigger_carries_payload() {
        let mut ctx = context(StepKind::Trigger, json!({}), json!({}));
        ctx.trigger_payload = json!({ "topic": "coffee" });
        let StepOutcome::Completed(out) = TriggerExecutor.execute(&ctx).await.unwrap() else {
            panic!("trigger never pauses");
        };
        assert_eq!(out["payload"]["topic"], "coffee");
        assert_eq!(out["userId"], "user-1");
        assert!(out["triggeredAt"].is_string());
    }
}
