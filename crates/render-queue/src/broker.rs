//! Durable job records and the broker that hands them to workers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};

/// URL selecting the in-process broker.
pub const MEMORY_BROKER_URL: &str = "memory://";

/// Lifecycle of a broker job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Failed,
}

/// One draft render request as the broker stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: String,
    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(project_id: Uuid, user_id: impl Into<String>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            user_id: user_id.into(),
            state: JobState::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            progress: 0.0,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    /// True when another attempt is allowed after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
pub fn retry_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}

/// Job transport between submitters and the worker pool.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Store a job and make it available to workers.
    async fn enqueue(&self, job: RenderJob) -> QueueResult<()>;

    /// Wait for the next job. `None` once the broker is closed.
    async fn dequeue(&self) -> Option<RenderJob>;

    /// Persist a job record.
    async fn update(&self, job: &RenderJob) -> QueueResult<()>;

    /// Record progress on a job.
    async fn set_progress(&self, id: Uuid, progress: f64) -> QueueResult<()>;

    async fn get(&self, id: Uuid) -> Option<RenderJob>;

    /// Make a stored job available again after `delay`.
    async fn requeue_after(&self, job: RenderJob, delay: Duration) -> QueueResult<()>;

    /// Stop handing out jobs.
    fn close(&self);
}

/// Process-local broker (`memory://`). Job records live as long as the process.
pub struct InMemoryBroker {
    jobs: RwLock<HashMap<Uuid, RenderJob>>,
    ready_tx: mpsc::UnboundedSender<Uuid>,
    ready_rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
    shutdown: watch::Sender<bool>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: RwLock::new(HashMap::new()),
            ready_tx,
            ready_rx: Mutex::new(ready_rx),
            shutdown,
        }
    }

    fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Every job record, oldest first.
    pub async fn jobs(&self) -> Vec<RenderJob> {
        let mut jobs: Vec<RenderJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.enqueued_at);
        jobs
    }
}

#[async_trait]
impl JobBroker for InMemoryBroker {
    async fn enqueue(&self, job: RenderJob) -> QueueResult<()> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        self.ready_tx.send(id).map_err(|_| QueueError::Closed)?;
        tracing::debug!(job_id = %id, "Render job enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> Option<RenderJob> {
        let mut shutdown = self.shutdown.subscribe();
        let mut ready = self.ready_rx.lock().await;
        loop {
            if *shutdown.borrow() {
                return None;
            }
            let id = tokio::select! {
                id = ready.recv() => id?,
                _ = shutdown.changed() => return None,
            };
            if let Some(job) = self.jobs.read().await.get(&id).cloned() {
                return Some(job);
            }
        }
    }

    async fn update(&self, job: &RenderJob) -> QueueResult<()> {
        let mut jobs = self.jobs.write().await;
        let slot = jobs.get_mut(&job.id).ok_or(QueueError::JobNotFound(job.id))?;
        *slot = job.clone();
        Ok(())
    }

    async fn set_progress(&self, id: Uuid, progress: f64) -> QueueResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        job.progress = job.progress.max(progress.clamp(0.0, 1.0));
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Option<RenderJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    async fn requeue_after(&self, job: RenderJob, delay: Duration) -> QueueResult<()> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let id = job.id;
        self.update(&job).await?;
        let ready = self.ready_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if ready.send(id).is_err() {
                tracing::debug!(job_id = %id, "Broker gone before retry became due");
            }
        });
        Ok(())
    }

    fn close(&self) {
        self.shutdown.send_replace(true);
    }
}
