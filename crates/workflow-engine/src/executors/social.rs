use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{lookup_str, merged_input};
use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;

/// Simulated publishing. Never touches a network.
pub struct SocialExecutor;

#[async_trait]
impl StepExecutor for SocialExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let platform = lookup_str(ctx, "platform").unwrap_or(&ctx.step_type).to_string();
        let video_url = lookup_str(ctx, "finalVideoUrl")
            .or_else(|| lookup_str(ctx, "videoUrl"))
            .map(str::to_string);
        let post_id = format!("sim-{}", Uuid::new_v4());

        tracing::info!(
            step = %ctx.step_id,
            platform = %platform,
            post_id = %post_id,
            "Simulated social post"
        );
        Ok(StepOutcome::Completed(json!({
            "postId": post_id,
            "platform": platform,
            "videoUrl": video_url,
            "caption": merged_input(ctx).get("text").cloned(),
            "simulated": true,
            "postedAt": Utc::now().to_rfc3339(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::test_support::context;
    use crate::graph::StepKind;

    #[tokio::test]
    async fn test_post_is_simulated() {
        let ctx = context(
            StepKind::Social,
            json!({ "platform": "tiktok" }),
            json!({ "final": { "finalVideoUrl": "blob://v.mp4" } }),
        );
        let StepOutcome::Completed(out) = SocialExecutor.execute(&ctx).await.unwrap() else {
            panic!("social never pauses");
        };
        assert!(out["postId"].as_str().unwrap().starts_with("sim-"));
        assert_eq!(out["videoUrl"], "blob://v.mp4");
        assert_eq!(out["simulated"], true);
    }
}
