//! Both queue modes against in-memory stores and a scripted encoder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clipflow_common::AppConfig;
use clipflow_edl::{ProjectStatus, VideoProject};
use clipflow_render_engine::{
    placeholder_video, EncodeProgress, EncodeProgressFn, Encoder, EncoderCommand, EncoderFailure,
    EncoderFailureKind, RenderOrchestrator, RenderSettings,
};
use clipflow_render_queue::{
    JobState, QueueError, QueueMode, RenderDeps, RenderQueue, RenderState,
};
use clipflow_services::{
    BlobStore, InMemoryBlobStore, InMemoryProjectStore, ProjectStore, StoreAssetFetcher,
};
use serde_json::json;
use uuid::Uuid;

struct FileEncoder;

#[async_trait]
impl Encoder for FileEncoder {
    async fn run(
        &self,
        command: &EncoderCommand,
        progress: Option<EncodeProgressFn>,
    ) -> Result<(), EncoderFailure> {
        if let (EncoderCommand::Compose(spec), Some(progress)) = (command, progress) {
            for step in 0..=2 {
                progress(EncodeProgress {
                    out_time_secs: spec.duration_sec * f64::from(step) / 2.0,
                    complete: step == 2,
                });
                tokio::task::yield_now().await;
            }
        }
        tokio::fs::write(command.output(), b"rendered")
            .await
            .map_err(|e| EncoderFailure::new(EncoderFailureKind::Io, e.to_string()))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "file"
    }
}

struct Fixture {
    blobs: Arc<InMemoryBlobStore>,
    projects: Arc<InMemoryProjectStore>,
    deps: RenderDeps,
}

async fn fixture() -> Fixture {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let projects = Arc::new(InMemoryProjectStore::new());
    let fetcher = Arc::new(StoreAssetFetcher::new(blobs.clone(), Duration::from_secs(2)));
    blobs
        .put("user-assets/user-1/clip.mp4", Bytes::from_static(b"clip"), "video/mp4")
        .await
        .unwrap();

    let orchestrator = Arc::new(RenderOrchestrator::new(
        Arc::new(FileEncoder),
        fetcher.clone(),
        RenderSettings::default(),
    ));
    let deps = RenderDeps {
        orchestrator,
        fetcher,
        blobs: blobs.clone(),
        projects: projects.clone(),
    };
    Fixture {
        blobs,
        projects,
        deps,
    }
}

fn edl_json(clip_url: &str) -> String {
    json!({
        "timeline": [
            { "sourceUrl": clip_url, "inSec": 0.0, "outSec": 2.0, "startSec": 0.0 },
            { "sourceUrl": clip_url, "inSec": 2.0, "outSec": 3.5, "startSec": 2.0 }
        ],
        "audio": { "voiceoverUrl": "" },
        "output": { "width": 1080, "height": 1920 }
    })
    .to_string()
}

impl Fixture {
    async fn project_with_edl(&self, edl: &str) -> Uuid {
        let key = format!("video-assets/user-1/{}/edl.json", Uuid::new_v4());
        let stored = self
            .blobs
            .put(&key, Bytes::from(edl.to_string()), "application/json")
            .await
            .unwrap();
        let project = VideoProject::new("user-1", stored.url);
        self.projects.create(project).await.unwrap().id
    }
}

fn broker_config(max_attempts: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.queue.broker_url = Some("memory://".into());
    config.queue.max_attempts = max_attempts;
    config.queue.backoff_base_ms = 10;
    config
}

#[tokio::test]
async fn test_inline_render_updates_project() {
    let fx = fixture().await;
    let project_id = fx
        .project_with_edl(&edl_json("blob://user-assets/user-1/clip.mp4"))
        .await;

    let queue = RenderQueue::from_config(&AppConfig::default(), fx.deps.clone()).unwrap();
    assert_eq!(queue.mode(), QueueMode::Inline);

    let submission = queue.submit_render(project_id, "user-1").await.unwrap();
    assert!(submission.job_id.is_none());
    assert_eq!(submission.status, RenderState::Rendering);

    let status = queue.wait(project_id).await.unwrap();
    assert_eq!(status.status, RenderState::Done);
    assert_eq!(status.progress, 1.0);

    let url = status.output_video_url.unwrap();
    let prefix = format!("blob://video-assets/user-1/{project_id}/draft-");
    assert!(url.starts_with(&prefix), "unexpected url {url}");

    let project = fx.projects.get(project_id).await.unwrap();
    assert_eq!(project.draft_video_url.as_deref(), Some(url.as_str()));
    assert_eq!(project.status, ProjectStatus::Ready);

    let preview = status.preview_image_url.unwrap();
    assert!(preview.starts_with("data:image/jpeg;base64,"));

    assert!(queue.clear(project_id));
    assert!(queue.status(project_id).is_none());
}

#[tokio::test]
async fn test_broker_render_completes_job() {
    let fx = fixture().await;
    let project_id = fx
        .project_with_edl(&edl_json("blob://user-assets/user-1/clip.mp4"))
        .await;

    let queue = RenderQueue::from_config(&broker_config(2), fx.deps.clone()).unwrap();
    assert_eq!(queue.mode(), QueueMode::Broker);

    let submission = queue.submit_render(project_id, "user-1").await.unwrap();
    let job_id = submission.job_id.unwrap();

    let status = queue.wait(project_id).await.unwrap();
    assert_eq!(status.status, RenderState::Done);

    let job = queue.job(job_id).await.unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.progress, 1.0);

    // Preview uploads are detached from the render; give them a moment.
    let prefix = format!("render-previews/{job_id}/");
    let mut previews = Vec::new();
    for _ in 0..50 {
        previews = fx.blobs.keys_with_prefix(&prefix).await;
        if !previews.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(previews.iter().any(|k| k.ends_with("frame-0.jpg")));

    queue.shutdown().await;
}

#[tokio::test]
async fn test_broker_retries_then_fails() {
    let fx = fixture().await;
    let project = VideoProject::new("user-1", "blob://video-assets/user-1/missing/edl.json");
    let project_id = fx.projects.create(project).await.unwrap().id;

    let queue = RenderQueue::from_config(&broker_config(2), fx.deps.clone()).unwrap();
    let job_id = queue
        .submit_render(project_id, "user-1")
        .await
        .unwrap()
        .job_id
        .unwrap();

    let status = queue.wait(project_id).await.unwrap();
    assert_eq!(status.status, RenderState::Failed);
    assert!(status.error.is_some());

    let job = queue.job(job_id).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 2);

    let project = fx.projects.get(project_id).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Failed);
    assert!(project.draft_video_url.is_none());
}

#[tokio::test]
async fn test_invalid_stored_edl_fails_render() {
    let fx = fixture().await;
    let project_id = fx.project_with_edl(r#"{"timeline": []}"#).await;

    let queue = RenderQueue::from_config(&AppConfig::default(), fx.deps.clone()).unwrap();
    queue.submit_render(project_id, "user-1").await.unwrap();

    let status = queue.wait(project_id).await.unwrap();
    assert_eq!(status.status, RenderState::Failed);
    assert!(status.error.unwrap().contains("EDL"));
}

#[tokio::test]
async fn test_unreachable_clip_stores_placeholder() {
    let fx = fixture().await;
    let project_id = fx
        .project_with_edl(&edl_json("blob://user-assets/user-1/gone.mp4"))
        .await;

    let queue = RenderQueue::from_config(&AppConfig::default(), fx.deps.clone()).unwrap();
    queue.submit_render(project_id, "user-1").await.unwrap();

    let status = queue.wait(project_id).await.unwrap();
    assert_eq!(status.status, RenderState::Done);

    let url = status.output_video_url.unwrap();
    let key = url.strip_prefix("blob://").unwrap();
    assert_eq!(fx.blobs.get(key).await.unwrap(), placeholder_video());
}

#[tokio::test]
async fn test_unknown_broker_scheme_rejected() {
    let fx = fixture().await;
    let mut config = AppConfig::default();
    config.queue.broker_url = Some("redis://localhost:6379".into());
    assert!(matches!(
        RenderQueue::from_config(&config, fx.deps),
        Err(QueueError::UnsupportedBroker(_))
    ));
}

#[tokio::test]
async fn test_status_unknown_project() {
    let fx = fixture().await;
    let queue = RenderQueue::from_config(&AppConfig::default(), fx.deps).unwrap();
    let id = Uuid::new_v4();
    assert!(queue.status(id).is_none());
    assert!(queue.wait(id).await.is_none());
    assert!(!queue.clear(id));
}
