//! The draft render job shared by both queue modes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use clipflow_edl::{parse_edl_bytes, ProjectStatus};
use clipflow_render_engine::{RenderCallbacks, RenderOrchestrator, RenderPolicy, RenderQuality};
use clipflow_services::keys::{draft_video_key, render_preview_key};
use clipflow_services::{AssetFetcher, BlobStore, ProjectStore};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::QueueResult;
use crate::status::{overall_progress, StatusStore};

/// Collaborators a render job needs.
#[derive(Clone)]
pub struct RenderDeps {
    pub orchestrator: Arc<RenderOrchestrator>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub blobs: Arc<dyn BlobStore>,
    pub projects: Arc<dyn ProjectStore>,
}

/// Where preview frames go.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PreviewSink {
    /// Inline `data:` URL in the status entry.
    Inline,
    /// Stored under the job's preview prefix and exposed as a presigned URL.
    Stored { job_id: Uuid },
}

pub(crate) struct RenderContext {
    pub deps: RenderDeps,
    pub statuses: Arc<StatusStore>,
    pub policy: RenderPolicy,
    pub presign_ttl: Duration,
}

impl RenderContext {
    /// Render a project's current EDL as a draft and point the project at it.
    ///
    /// Returns the stored video URL.
    #[tracing::instrument(skip(self, sink, progress))]
    pub async fn render_draft(
        &self,
        project_id: Uuid,
        user_id: &str,
        sink: PreviewSink,
        progress: Option<mpsc::UnboundedSender<f64>>,
    ) -> QueueResult<String> {
        let projects = &self.deps.projects;
        let project = projects.get(project_id).await?;
        projects
            .set_status(project_id, ProjectStatus::Rendering)
            .await?;

        // Re-validated on every read: the blob may have been replaced since it was written.
        let raw = self.deps.fetcher.fetch(&project.edl_url).await?;
        let edl = parse_edl_bytes(&raw)?;

        let uploads = PreviewUploads::default();
        let callbacks = self.callbacks(project_id, sink, progress, &uploads);
        let rendered = self
            .deps
            .orchestrator
            .render_with_policy(&edl, None, RenderQuality::Draft, callbacks, self.policy)
            .await;
        // Previews must land before the job reports a terminal state.
        uploads.drain().await;
        let rendered = rendered?;
        if rendered.placeholder {
            tracing::warn!(project_id = %project_id, "Draft render degraded to placeholder");
        }

        let key = draft_video_key(
            user_id,
            &project_id.to_string(),
            Utc::now().timestamp_millis(),
        );
        let stored = self
            .deps
            .blobs
            .put(&key, rendered.bytes, "video/mp4")
            .await?;
        projects.set_draft_video(project_id, &stored.url).await?;

        tracing::info!(project_id = %project_id, url = %stored.url, "Draft video stored");
        Ok(stored.url)
    }

    /// Mark the project failed after its last attempt. Errors are logged only.
    pub async fn mark_failed(&self, project_id: Uuid, error: &str) {
        self.statuses.fail(project_id, error.to_string());
        if let Err(e) = self
            .deps
            .projects
            .set_status(project_id, ProjectStatus::Failed)
            .await
        {
            tracing::warn!(project_id = %project_id, error = %e, "Failed to mark project failed");
        }
    }

    fn callbacks(
        &self,
        project_id: Uuid,
        sink: PreviewSink,
        progress: Option<mpsc::UnboundedSender<f64>>,
        uploads: &PreviewUploads,
    ) -> RenderCallbacks {
        let statuses = self.statuses.clone();
        let callbacks = RenderCallbacks::none().with_progress(move |report| {
            let overall = overall_progress(report);
            statuses.set_progress(project_id, overall);
            if let Some(tx) = &progress {
                let _ = tx.send(overall);
            }
        });

        let statuses = self.statuses.clone();
        match sink {
            PreviewSink::Inline => callbacks.with_preview(move |frame: Bytes| {
                statuses.set_preview(project_id, jpeg_data_url(&frame));
            }),
            PreviewSink::Stored { job_id } => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    return callbacks;
                };
                let blobs = self.deps.blobs.clone();
                let ttl = self.presign_ttl;
                let frames = Arc::new(AtomicU64::new(0));
                let uploads = uploads.clone();
                callbacks.with_preview(move |frame: Bytes| {
                    let n = frames.fetch_add(1, Ordering::Relaxed);
                    let key = render_preview_key(&job_id.to_string(), n);
                    let blobs = blobs.clone();
                    let statuses = statuses.clone();
                    uploads.spawn(&runtime, async move {
                        let uploaded = async {
                            blobs.put(&key, frame, "image/jpeg").await?;
                            blobs.presign(&key, ttl).await
                        };
                        match uploaded.await {
                            Ok(url) => statuses.set_preview(project_id, url),
                            Err(e) => tracing::debug!(key = %key, error = %e, "Preview upload failed"),
                        }
                    });
                })
            }
        }
    }
}

/// Preview uploads started by one render.
#[derive(Clone, Default)]
pub(crate) struct PreviewUploads(Arc<Mutex<JoinSet<()>>>);

impl PreviewUploads {
    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn(
        &self,
        runtime: &tokio::runtime::Handle,
        upload: impl std::future::Future<Output = ()> + Send + 'static,
    ) {
        self.lock().spawn_on(upload, runtime);
    }

    /// Wait for every upload started so far.
    pub(crate) async fn drain(&self) {
        let mut pending = std::mem::take(&mut *self.lock());
        while pending.join_next().await.is_some() {}
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

fn jpeg_data_url(frame: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(frame)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_data_url() {
        assert_eq!(jpeg_data_url(b"abc"), "data:image/jpeg;base64,YWJj");
    }

    #[tokio::test]
    async fn test_drain_waits_for_uploads() {
        let uploads = PreviewUploads::default();
        let statuses = Arc::new(StatusStore::new());
        let id = Uuid::new_v4();
        statuses.begin(id);

        let runtime = tokio::runtime::Handle::current();
        for n in 0..3 {
            let statuses = statuses.clone();
            uploads.spawn(&runtime, async move {
                tokio::time::sleep(Duration::from_millis(10 * (3 - n))).await;
                statuses.set_preview(id, format!("blob://frame-{n}.jpg"));
            });
        }
        uploads.drain().await;
        assert_eq!(uploads.len(), 0);

        statuses.complete(id, "blob://out.mp4".into());
        let status = statuses.get(id).unwrap();
        assert!(status.preview_image_url.is_some());
        assert_eq!(status.status, crate::status::RenderState::Done);
    }
}
