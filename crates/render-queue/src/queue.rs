//! Render queue: broker-backed worker pool or inline renders.
//!
//! The mode is fixed at construction. Both modes write the same
//! [`StatusStore`], so pollers never need to know which one is active.

use std::sync::Arc;
use std::time::Duration;

use clipflow_common::AppConfig;
use clipflow_render_engine::RenderPolicy;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broker::{retry_delay, InMemoryBroker, JobBroker, JobState, RenderJob, MEMORY_BROKER_URL};
use crate::error::{QueueError, QueueResult};
use crate::job::{PreviewSink, RenderContext, RenderDeps};
use crate::status::{RenderState, RenderStatus, StatusStore};

/// Longest wait between attempts of one job.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(300);

/// Which way renders are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Jobs go through a broker and a fixed worker pool.
    Broker,
    /// Renders run in-process as soon as they are submitted.
    Inline,
}

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub policy: RenderPolicy,
    pub presign_ttl: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for QueueSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.queue.concurrency.max(1),
            max_attempts: config.queue.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.queue.backoff_base_ms),
            policy: RenderPolicy::from_degrade_flag(config.queue.degrade_on_failure),
            presign_ttl: Duration::from_secs(config.storage.presign_ttl_secs),
        }
    }
}

/// Answer to a submit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSubmission {
    /// Broker job id. Absent in inline mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub status: RenderState,
}

enum Backend {
    Inline,
    Broker {
        broker: Arc<dyn JobBroker>,
        workers: JoinHandle<()>,
    },
}

pub struct RenderQueue {
    ctx: Arc<RenderContext>,
    settings: QueueSettings,
    backend: Backend,
}

impl RenderQueue {
    /// Choose the mode from configuration. Must be called inside a tokio runtime.
    pub fn from_config(config: &AppConfig, deps: RenderDeps) -> QueueResult<Self> {
        let settings = QueueSettings::from(config);
        match config.queue.broker_url.as_deref().map(str::trim) {
            None | Some("") => Ok(Self::inline(deps, settings)),
            Some(MEMORY_BROKER_URL) => Ok(Self::with_broker(
                deps,
                Arc::new(InMemoryBroker::new()),
                settings,
            )),
            Some(other) => Err(QueueError::UnsupportedBroker(other.to_string())),
        }
    }

    pub fn inline(deps: RenderDeps, settings: QueueSettings) -> Self {
        tracing::info!("Render queue running inline");
        Self {
            ctx: Self::context(deps, &settings),
            settings,
            backend: Backend::Inline,
        }
    }

    /// Start a worker pool on `broker`. Must be called inside a tokio runtime.
    pub fn with_broker(
        deps: RenderDeps,
        broker: Arc<dyn JobBroker>,
        settings: QueueSettings,
    ) -> Self {
        let ctx = Self::context(deps, &settings);
        let workers = tokio::spawn(worker_pool(
            ctx.clone(),
            broker.clone(),
            settings.clone(),
        ));
        Self {
            ctx,
            settings,
            backend: Backend::Broker { broker, workers },
        }
    }

    fn context(deps: RenderDeps, settings: &QueueSettings) -> Arc<RenderContext> {
        Arc::new(RenderContext {
            deps,
            statuses: Arc::new(StatusStore::new()),
            policy: settings.policy,
            presign_ttl: settings.presign_ttl,
        })
    }

    pub fn mode(&self) -> QueueMode {
        match self.backend {
            Backend::Inline => QueueMode::Inline,
            Backend::Broker { .. } => QueueMode::Broker,
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Request a draft render of a project's current EDL.
    #[tracing::instrument(skip(self), fields(mode = ?self.mode()))]
    pub async fn submit_render(
        &self,
        project_id: Uuid,
        user_id: &str,
    ) -> QueueResult<RenderSubmission> {
        self.ctx.statuses.begin(project_id);
        match &self.backend {
            Backend::Broker { broker, .. } => {
                let job = RenderJob::new(project_id, user_id, self.settings.max_attempts);
                let job_id = job.id;
                broker.enqueue(job).await?;
                tracing::info!(job_id = %job_id, project_id = %project_id, "Render job queued");
                Ok(RenderSubmission {
                    job_id: Some(job_id),
                    status: RenderState::Rendering,
                })
            }
            Backend::Inline => {
                spawn_inline(self.ctx.clone(), project_id, user_id.to_string());
                Ok(RenderSubmission {
                    job_id: None,
                    status: RenderState::Rendering,
                })
            }
        }
    }

    /// Current status for a project's render.
    pub fn status(&self, project_id: Uuid) -> Option<RenderStatus> {
        self.ctx.statuses.get(project_id)
    }

    /// Forget a finished render. Returns false while it is still running.
    pub fn clear(&self, project_id: Uuid) -> bool {
        self.ctx.statuses.clear(project_id)
    }

    /// Wait for a project's render to finish.
    pub async fn wait(&self, project_id: Uuid) -> Option<RenderStatus> {
        self.ctx.statuses.wait_terminal(project_id).await
    }

    /// Broker job record. Always `None` inline.
    pub async fn job(&self, job_id: Uuid) -> Option<RenderJob> {
        match &self.backend {
            Backend::Broker { broker, .. } => broker.get(job_id).await,
            Backend::Inline => None,
        }
    }

    /// Stop taking jobs and wait for the pool to stop dispatching.
    ///
    /// Jobs already running finish on their own tasks.
    pub async fn shutdown(self) {
        if let Backend::Broker { broker, workers } = self.backend {
            broker.close();
            if let Err(e) = workers.await {
                tracing::warn!(error = %e, "Render worker pool ended abnormally");
            }
        }
    }
}

/// Run one inline render under a supervisor that records panics as failures.
fn spawn_inline(ctx: Arc<RenderContext>, project_id: Uuid, user_id: String) {
    let render_ctx = ctx.clone();
    let render = tokio::spawn(async move {
        match render_ctx
            .render_draft(project_id, &user_id, PreviewSink::Inline, None)
            .await
        {
            Ok(url) => render_ctx.statuses.complete(project_id, url),
            Err(e) => {
                tracing::error!(project_id = %project_id, error = %e, "Inline render failed");
                render_ctx.mark_failed(project_id, &e.to_string()).await;
            }
        }
    });
    tokio::spawn(async move {
        if let Err(e) = render.await {
            tracing::error!(project_id = %project_id, error = %e, "Inline render task aborted");
            ctx.mark_failed(project_id, &format!("render task aborted: {e}"))
                .await;
        }
    });
}

async fn worker_pool(ctx: Arc<RenderContext>, broker: Arc<dyn JobBroker>, settings: QueueSettings) {
    tracing::info!(
        concurrency = settings.concurrency,
        max_attempts = settings.max_attempts,
        "Render worker pool started"
    );
    let semaphore = Arc::new(Semaphore::new(settings.concurrency));

    loop {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let Some(job) = broker.dequeue().await else {
            break;
        };
        let ctx = ctx.clone();
        let broker = broker.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            let project_id = job.project_id;
            let worker = tokio::spawn(process_job(ctx.clone(), broker, job, settings));
            if let Err(e) = worker.await {
                tracing::error!(project_id = %project_id, error = %e, "Render worker panicked");
                ctx.mark_failed(project_id, &format!("render worker aborted: {e}"))
                    .await;
            }
            drop(permit);
        });
    }

    tracing::info!("Render worker pool stopped");
}

#[tracing::instrument(skip_all, fields(job_id = %job.id, project_id = %job.project_id))]
async fn process_job(
    ctx: Arc<RenderContext>,
    broker: Arc<dyn JobBroker>,
    mut job: RenderJob,
    settings: QueueSettings,
) {
    job.state = JobState::Active;
    job.attempts += 1;
    job.updated_at = chrono::Utc::now();
    if let Err(e) = broker.update(&job).await {
        tracing::warn!(error = %e, "Failed to mark job active");
    }
    tracing::info!(attempt = job.attempts, "Render job started");

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f64>();
    let forward = {
        let broker = broker.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                if let Err(e) = broker.set_progress(job_id, progress).await {
                    tracing::debug!(error = %e, "Failed to record job progress");
                }
            }
        })
    };

    let result = ctx
        .render_draft(
            job.project_id,
            &job.user_id,
            PreviewSink::Stored { job_id: job.id },
            Some(progress_tx),
        )
        .await;
    let _ = forward.await;

    if let Some(latest) = broker.get(job.id).await {
        job.progress = latest.progress;
    }
    job.updated_at = chrono::Utc::now();

    match result {
        Ok(url) => {
            job.state = JobState::Completed;
            job.progress = 1.0;
            job.last_error = None;
            if let Err(e) = broker.update(&job).await {
                tracing::warn!(error = %e, "Failed to mark job completed");
            }
            ctx.statuses.complete(job.project_id, url);
            tracing::info!("Render job completed");
        }
        Err(e) if job.can_retry() => {
            let delay = retry_delay(settings.backoff_base, job.attempts, MAX_RETRY_BACKOFF);
            tracing::warn!(
                attempt = job.attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %e,
                "Render job failed, retrying"
            );
            job.state = JobState::Queued;
            job.last_error = Some(e.to_string());
            if let Err(requeue) = broker.requeue_after(job.clone(), delay).await {
                tracing::error!(error = %requeue, "Failed to requeue render job");
                ctx.mark_failed(job.project_id, &e.to_string()).await;
            }
        }
        Err(e) => {
            tracing::error!(attempts = job.attempts, error = %e, "Render job failed permanently");
            job.state = JobState::Failed;
            job.last_error = Some(e.to_string());
            if let Err(update) = broker.update(&job).await {
                tracing::warn!(error = %update, "Failed to mark job failed");
            }
            ctx.mark_failed(job.project_id, &e.to_string()).await;
        }
    }
}
