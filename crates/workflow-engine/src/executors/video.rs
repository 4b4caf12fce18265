//! Video steps: planning an edit and delivering the final render.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use clipflow_auto_edit::{build_edl, AspectRatio, EdlBuildOptions, SourceClip};
use clipflow_edl::{parse_edl_bytes, VideoProject};
use clipflow_render_engine::{RenderCallbacks, RenderPolicy, RenderQuality};
use clipflow_services::keys::{edl_key, final_video_key};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{config_f64, lookup, lookup_str, number, require_str, ExecutorServices};
use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;
use crate::graph::{StepKind, VideoKind};

const DEFAULT_TARGET_SECS: f64 = 30.0;

pub struct VideoExecutor {
    services: Arc<ExecutorServices>,
}

impl VideoExecutor {
    pub fn new(services: Arc<ExecutorServices>) -> Self {
        Self { services }
    }

    /// Plan an EDL, store it, create the project and ask for a draft render.
    #[tracing::instrument(skip_all, fields(step = %ctx.step_id))]
    async fn auto_edit(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let clips = source_clips(lookup(ctx, "clips"))?;

        let mut options = EdlBuildOptions::new(
            clips,
            config_f64(ctx, "targetDurationSec").unwrap_or(DEFAULT_TARGET_SECS),
        );
        if let Some(min) = config_f64(ctx, "minClipSec") {
            options.min_clip_sec = min;
        }
        if let Some(max) = config_f64(ctx, "maxClipSec") {
            options.max_clip_sec = max;
        }
        options.seed = lookup(ctx, "seed").and_then(number).map(|s| s.max(0.0) as u64);
        if let Some(ratio) = lookup_str(ctx, "aspectRatio") {
            options.aspect_ratio = ratio.parse::<AspectRatio>()?;
        }
        options.hook_text = lookup_str(ctx, "hookText").map(str::to_string);
        options.voiceover_url = lookup_str(ctx, "audioUrl")
            .or_else(|| lookup_str(ctx, "voiceoverUrl"))
            .map(str::to_string);
        options.music_url = lookup_str(ctx, "musicUrl").map(str::to_string);

        let edl = build_edl(options)?;
        let json = edl
            .to_json_pretty()
            .map_err(|e| StepError::InvalidConfig(format!("EDL serialization failed: {e}")))?;

        let mut project = VideoProject::new(&ctx.user_id, String::new());
        let key = edl_key(
            &ctx.user_id,
            &project.id.to_string(),
            Utc::now().timestamp_millis(),
        );
        let stored = self
            .services
            .blobs
            .put(&key, Bytes::from(json), "application/json")
            .await?;
        project.edl_url = stored.url.clone();
        let project = match self.services.projects.create(project).await {
            Ok(project) => project,
            Err(e) => {
                if let Err(cleanup) = self.services.blobs.delete(&key).await {
                    tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned EDL");
                }
                return Err(e.into());
            }
        };

        let (render_job_id, render_status) = match &self.services.render_queue {
            Some(queue) => {
                let submission = queue.submit_render(project.id, &ctx.user_id).await?;
                (submission.job_id, Some(submission.status))
            }
            None => (None, None),
        };

        tracing::info!(
            project_id = %project.id,
            clips = edl.timeline.len(),
            duration_sec = edl.duration_sec(),
            "Auto-edit planned"
        );
        Ok(StepOutcome::Completed(json!({
            "projectId": project.id,
            "edlUrl": stored.url,
            "durationSec": edl.duration_sec(),
            "clipCount": edl.timeline.len(),
            "renderJobId": render_job_id,
            "renderStatus": render_status,
        })))
    }

    /// Render the approved EDL at full quality and attach it to the project.
    #[tracing::instrument(skip_all, fields(step = %ctx.step_id))]
    async fn render_final(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let orchestrator = self
            .services
            .orchestrator
            .as_ref()
            .ok_or(StepError::NotConfigured("render orchestrator"))?;

        let project_id = parse_project_id(require_str(ctx, "projectId")?)?;
        let edl_url = lookup_str(ctx, "approvedEdlUrl")
            .or_else(|| lookup_str(ctx, "edlUrl"))
            .ok_or_else(|| StepError::MissingInput("approvedEdlUrl".into()))?;

        let raw = self.services.fetcher.fetch(edl_url).await?;
        let edl = parse_edl_bytes(&raw)?;

        let video = orchestrator
            .render_with_policy(
                &edl,
                None,
                RenderQuality::Final,
                RenderCallbacks::none(),
                RenderPolicy::Degrade,
            )
            .await?;

        let key = final_video_key(
            &ctx.user_id,
            &project_id.to_string(),
            Utc::now().timestamp_millis(),
        );
        let stored = self.services.blobs.put(&key, video.bytes, "video/mp4").await?;
        self.services
            .projects
            .set_final_video(project_id, &stored.url)
            .await?;

        Ok(StepOutcome::Completed(json!({
            "projectId": project_id,
            "finalVideoUrl": stored.url,
            "placeholder": video.placeholder,
        })))
    }
}

#[async_trait]
impl StepExecutor for VideoExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match ctx.kind {
            StepKind::Video(VideoKind::AutoEdit) => self.auto_edit(ctx).await,
            StepKind::Video(VideoKind::RenderFinal) => self.render_final(ctx).await,
            _ => Ok(StepOutcome::Completed(json!({
                "videoUrl": Value::Null,
                "stepType": ctx.step_type,
                "placeholder": true,
            }))),
        }
    }
}

fn parse_project_id(raw: &str) -> Result<Uuid, StepError> {
    raw.parse()
        .map_err(|_| StepError::InvalidConfig(format!("projectId '{raw}' is not a UUID")))
}

/// Clips given as objects (`{url, durationSec?}`) or bare URL strings.
fn source_clips(value: Option<&Value>) -> Result<Vec<SourceClip>, StepError> {
    let Some(Value::Array(items)) = value else {
        return Err(StepError::MissingInput("clips".into()));
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(url) => Ok(SourceClip::new(url.clone(), None)),
            other => serde_json::from_value(other.clone())
                .map_err(|e| StepError::InvalidConfig(format!("bad clip entry: {e}"))),
        })
        .collect()
}
