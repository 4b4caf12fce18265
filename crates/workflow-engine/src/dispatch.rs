//! Step dispatch.
//!
//! Each category has one executor and [`Dispatcher::executor`] matches
//! [`StepKind`] exhaustively, so a new kind cannot be added without deciding
//! who runs it. Executors can be swapped individually.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StepError, StepFailure};
use crate::executors::{
    AiExecutor, ExecutorServices, LogicExecutor, ReviewExecutor, SocialExecutor, TriggerExecutor,
    UtilityExecutor, VideoExecutor, VoiceExecutor,
};
use crate::graph::{StepCategory, StepKind};

/// Everything an executor may look at.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub step_id: String,
    pub step_type: String,
    pub kind: StepKind,
    pub config: Map<String, Value>,
    /// Upstream outputs keyed by source handle (or source step id).
    pub input: Map<String, Value>,
    pub user_id: String,
    /// Payload the run was started with.
    pub trigger_payload: Value,
}

/// Successful result of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(Value),
    /// Suspend the run until the review session is resolved.
    Paused { review_id: Uuid, output: Value },
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Routes steps to their category executor. Holds no run state.
pub struct Dispatcher {
    trigger: Arc<dyn StepExecutor>,
    ai: Arc<dyn StepExecutor>,
    voice: Arc<dyn StepExecutor>,
    video: Arc<dyn StepExecutor>,
    review: Arc<dyn StepExecutor>,
    social: Arc<dyn StepExecutor>,
    logic: Arc<dyn StepExecutor>,
    utility: Arc<dyn StepExecutor>,
}

impl Dispatcher {
    /// Default executors for every category.
    pub fn new(services: ExecutorServices) -> Self {
        let services = Arc::new(services);
        Self {
            trigger: Arc::new(TriggerExecutor),
            ai: Arc::new(AiExecutor::new(services.clone())),
            voice: Arc::new(VoiceExecutor::new(services.clone())),
            video: Arc::new(VideoExecutor::new(services.clone())),
            review: Arc::new(ReviewExecutor::new(services.clone())),
            social: Arc::new(SocialExecutor),
            logic: Arc::new(LogicExecutor::new(services.clone())),
            utility: Arc::new(UtilityExecutor::new(services)),
        }
    }

    /// Replace the executor for one category.
    pub fn with_executor(mut self, category: StepCategory, executor: Arc<dyn StepExecutor>) -> Self {
        let slot = match category {
            StepCategory::Trigger => &mut self.trigger,
            StepCategory::Ai => &mut self.ai,
            StepCategory::Voice => &mut self.voice,
            StepCategory::Video => &mut self.video,
            StepCategory::Review => &mut self.review,
            StepCategory::Social => &mut self.social,
            StepCategory::Logic => &mut self.logic,
            StepCategory::Utility => &mut self.utility,
        };
        *slot = executor;
        self
    }

    fn executor(&self, kind: StepKind) -> &Arc<dyn StepExecutor> {
        match kind {
            StepKind::Trigger => &self.trigger,
            StepKind::Ai => &self.ai,
            StepKind::Voice => &self.voice,
            StepKind::Video(_) => &self.video,
            StepKind::Review(_) => &self.review,
            StepKind::Social => &self.social,
            StepKind::Logic(_) => &self.logic,
            StepKind::Utility(_) => &self.utility,
        }
    }

    /// Run one step. Every executor error comes back as a [`StepFailure`].
    pub async fn dispatch(&self, ctx: &StepContext) -> Result<StepOutcome, StepFailure> {
        let started = Instant::now();
        match self.executor(ctx.kind).execute(ctx).await {
            Ok(outcome) => {
                tracing::debug!(
                    step = %ctx.step_id,
                    step_type = %ctx.step_type,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Step finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    step = %ctx.step_id,
                    step_type = %ctx.step_type,
                    error = %e,
                    "Step failed"
                );
                Err(StepFailure::from(&e))
            }
        }
    }
}
