//! The run scheduler.
//!
//! A run walks the graph's topological order one step at a time on its own
//! supervised task. Every state change is saved to the [`RunStore`] before the
//! loop moves on, so a poller always sees the latest step logs.
//!
//! A review gate that answers [`StepOutcome::Paused`] suspends the run. The
//! engine keeps the graph and trigger context in memory until
//! [`WorkflowEngine::resolve_review`] (or [`WorkflowEngine::expire_reviews`])
//! finishes the gate and restarts the loop at the next step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use clipflow_services::keys::edl_key;
use clipflow_services::{BlobStore, ProjectStore};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::dispatch::{Dispatcher, StepContext, StepOutcome};
use crate::error::{EngineError, EngineResult, StepError};
use crate::executors::{resolved_gate_output, ExecutorServices, ACTIVE_HANDLE};
use crate::graph::{Step, WorkflowGraph};
use crate::review::{Resolution, ReviewSession, ReviewStatus, ReviewStore};
use crate::run::{Run, RunStatus};
use crate::store::RunStore;

/// Who started a run and with what.
#[derive(Debug, Clone, Default)]
pub struct InitialContext {
    pub user_id: String,
    pub payload: Value,
}

impl InitialContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A started (or resumed) run.
///
/// `run` is the snapshot taken when the task was spawned. [`RunHandle::wait`]
/// yields the state the task left the run in, or the engine error that
/// stopped it.
#[derive(Debug)]
pub struct RunHandle {
    pub run: Run,
    task: JoinHandle<EngineResult<Run>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub async fn wait(self) -> EngineResult<Run> {
        self.task
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }
}

struct Suspension {
    graph: Arc<WorkflowGraph>,
    context: InitialContext,
    step_id: String,
}

struct Shared {
    dispatcher: Dispatcher,
    runs: Arc<dyn RunStore>,
    reviews: Arc<dyn ReviewStore>,
    blobs: Arc<dyn BlobStore>,
    projects: Arc<dyn ProjectStore>,
    permits: Arc<Semaphore>,
    suspended: Mutex<HashMap<Uuid, Suspension>>,
}

/// Starts, drives and resumes workflow runs.
#[derive(Clone)]
pub struct WorkflowEngine {
    shared: Arc<Shared>,
}

impl WorkflowEngine {
    /// Engine with the default executor for every category.
    pub fn new(services: ExecutorServices, runs: Arc<dyn RunStore>) -> Self {
        Self::with_dispatcher(Dispatcher::new(services.clone()), &services, runs)
    }

    pub fn with_dispatcher(
        dispatcher: Dispatcher,
        services: &ExecutorServices,
        runs: Arc<dyn RunStore>,
    ) -> Self {
        let max_concurrent_runs = services.limits.max_concurrent_runs;
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                runs,
                reviews: services.reviews.clone(),
                blobs: services.blobs.clone(),
                projects: services.projects.clone(),
                permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
                suspended: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Validate and order the graph, record a running run and start driving it.
    ///
    /// Cyclic or malformed graphs are rejected before any run exists.
    #[tracing::instrument(skip_all, fields(workflow_id = %graph.id, user_id = %context.user_id))]
    pub async fn execute(
        &self,
        graph: WorkflowGraph,
        context: InitialContext,
    ) -> EngineResult<RunHandle> {
        graph.validate()?;
        let run = {
            let order = graph.topological_order()?;
            Run::new(graph.id.clone(), &order)
        };
        self.shared.runs.save(&run).await?;
        tracing::info!(run_id = %run.id, steps = run.steps.len(), "Run started");

        let graph = Arc::new(graph);
        Ok(self.spawn_drive(graph, context, run, 0))
    }

    /// Current state of a run.
    pub async fn poll(&self, run_id: Uuid) -> EngineResult<Run> {
        self.shared
            .runs
            .get(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Finish a paused review gate and resume the run at the following step.
    ///
    /// The caller that claims the run's suspension wins; a concurrent resolve of
    /// the same gate gets [`EngineError::NotPaused`]. Any failure after the claim
    /// puts the suspension back so the gate can be resolved again.
    #[tracing::instrument(skip(self, resolution))]
    pub async fn resolve_review(
        &self,
        run_id: Uuid,
        step_id: &str,
        resolution: Resolution,
    ) -> EngineResult<RunHandle> {
        if let Resolution::Edit { edl: Some(edl) } = &resolution {
            edl.check().map_err(StepError::from)?;
        }

        let session = self
            .shared
            .reviews
            .get(run_id, step_id)
            .await?
            .ok_or_else(|| EngineError::ReviewNotFound {
                run_id,
                step_id: step_id.to_string(),
            })?;
        if session.status == ReviewStatus::Resolved {
            return Err(EngineError::ReviewResolved(session.id));
        }

        let suspension = self.shared.claim_suspension(run_id, step_id)?;
        match self
            .finish_gate(&suspension, &session, step_id, resolution)
            .await
        {
            Ok((run, next)) => Ok(self.spawn_drive(
                suspension.graph,
                suspension.context,
                run,
                next,
            )),
            Err(e) => {
                tracing::warn!(run_id = %run_id, step = %step_id, error = %e, "Review resolution failed, run stays paused");
                self.shared.lock_suspended().insert(run_id, suspension);
                Err(e)
            }
        }
    }

    /// Record the gate's decision. Returns the resumed run and the index to continue from.
    async fn finish_gate(
        &self,
        suspension: &Suspension,
        session: &ReviewSession,
        step_id: &str,
        resolution: Resolution,
    ) -> EngineResult<(Run, usize)> {
        let shared = &self.shared;
        let run_id = session.run_id;
        let paused = self.poll(run_id).await?;
        if paused.status != RunStatus::Paused || paused.waiting_step() != Some(step_id) {
            return Err(EngineError::NotPaused(run_id));
        }
        let next = next_index(&suspension.graph, step_id)?;

        let provisional = paused
            .log(step_id)
            .and_then(|log| log.output.clone())
            .unwrap_or(Value::Null);
        let current_edl = session
            .edl_url
            .clone()
            .or_else(|| provisional.get("edlUrl").and_then(Value::as_str).map(str::to_string));

        let (approved, decision) = match resolution {
            Resolution::Approve => (current_edl, "approve"),
            Resolution::Edit { edl: None } => (current_edl, "edit"),
            Resolution::Edit { edl: Some(edl) } => {
                let project_id = session
                    .project_id
                    .ok_or_else(|| StepError::MissingInput("projectId".into()))?;
                let json = edl.to_json_pretty().map_err(|e| {
                    StepError::InvalidConfig(format!("EDL serialization failed: {e}"))
                })?;
                let key = edl_key(
                    &suspension.context.user_id,
                    &project_id.to_string(),
                    Utc::now().timestamp_millis(),
                );
                let stored = shared
                    .blobs
                    .put(&key, Bytes::from(json), "application/json")
                    .await?;
                if let Err(e) = shared.projects.set_edl_url(project_id, &stored.url).await {
                    shared.blobs.delete(&key).await.ok();
                    return Err(e.into());
                }
                tracing::info!(project_id = %project_id, edl_url = %stored.url, "Edited EDL stored");
                (Some(stored.url), "edit")
            }
        };

        let now = Utc::now();
        let mut run = paused.clone();
        run.mark_success(
            step_id,
            resolved_gate_output(&provisional, approved.as_deref(), decision),
            now,
        );
        run.resume();
        shared.runs.save(&run).await?;
        if let Err(e) = shared.reviews.resolve(session.id, now).await {
            if let Err(restore) = shared.runs.save(&paused).await {
                tracing::warn!(run_id = %run_id, error = %restore, "Failed to restore paused run");
            }
            return Err(e.into());
        }
        tracing::info!(run_id = %run_id, review_id = %session.id, decision, "Review resolved");
        Ok((run, next))
    }

    /// Auto-approve every pending review whose expiry is at or before `now`.
    ///
    /// Returns the handles of the runs that resumed.
    pub async fn expire_reviews(&self, now: DateTime<Utc>) -> EngineResult<Vec<RunHandle>> {
        let mut resumed = Vec::new();
        for session in self.shared.reviews.pending().await? {
            if !session.is_expired(now) {
                continue;
            }
            match self
                .resolve_review(session.run_id, &session.step_id, Resolution::Approve)
                .await
            {
                Ok(handle) => {
                    tracing::info!(run_id = %session.run_id, step = %session.step_id, "Review expired, auto-approved");
                    resumed.push(handle);
                }
                Err(e) => tracing::warn!(
                    run_id = %session.run_id,
                    step = %session.step_id,
                    error = %e,
                    "Could not auto-approve expired review"
                ),
            }
        }
        Ok(resumed)
    }

    /// Drive `run` from `start` on a supervised task.
    fn spawn_drive(
        &self,
        graph: Arc<WorkflowGraph>,
        context: InitialContext,
        run: Run,
        start: usize,
    ) -> RunHandle {
        let snapshot = run.clone();
        let run_id = run.id;
        let shared = self.shared.clone();
        let inner = tokio::spawn(drive(shared.clone(), graph, context, run, start));
        let task = tokio::spawn(async move {
            let outcome = match inner.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::Task(e.to_string())),
            };
            if let Err(e) = &outcome {
                tracing::error!(run_id = %run_id, error = %e, "Run aborted");
                shared.abort_run(run_id, &e.to_string()).await;
            }
            outcome
        });
        RunHandle {
            run: snapshot,
            task,
        }
    }
}

impl Shared {
    /// Take the run's suspension if it is parked on `step_id`.
    fn claim_suspension(&self, run_id: Uuid, step_id: &str) -> EngineResult<Suspension> {
        let mut suspended = self.lock_suspended();
        match suspended.get(&run_id) {
            Some(s) if s.step_id == step_id => suspended
                .remove(&run_id)
                .ok_or(EngineError::NotPaused(run_id)),
            _ => Err(EngineError::NotPaused(run_id)),
        }
    }

    fn lock_suspended(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Suspension>> {
        self.suspended
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Best-effort: record an engine failure on the stored run.
    async fn abort_run(&self, run_id: Uuid, error: &str) {
        self.lock_suspended().remove(&run_id);
        match self.runs.get(run_id).await {
            Ok(Some(mut run)) if !run.status.is_terminal() => {
                run.abort(error, Utc::now());
                if let Err(e) = self.runs.save(&run).await {
                    tracing::warn!(run_id = %run_id, error = %e, "Failed to record run abort");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(run_id = %run_id, error = %e, "Failed to load aborted run"),
        }
    }
}

async fn drive(
    shared: Arc<Shared>,
    graph: Arc<WorkflowGraph>,
    context: InitialContext,
    mut run: Run,
    start: usize,
) -> EngineResult<Run> {
    let _permit = shared
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?;

    let order: Vec<Step> = graph.topological_order()?.into_iter().cloned().collect();
    for step in order.iter().skip(start) {
        let input = gather_inputs(&graph, &run, &step.id);
        run.mark_running(&step.id, Value::Object(input.clone()), Utc::now());
        shared.runs.save(&run).await?;
        tokio::task::yield_now().await;

        let ctx = StepContext {
            run_id: run.id,
            workflow_id: graph.id.clone(),
            step_id: step.id.clone(),
            step_type: step.step_type.clone(),
            kind: step.kind,
            config: step.config.clone(),
            input,
            user_id: context.user_id.clone(),
            trigger_payload: context.payload.clone(),
        };

        match shared.dispatcher.dispatch(&ctx).await {
            Ok(StepOutcome::Completed(output)) => {
                run.mark_success(&step.id, output, Utc::now());
                shared.runs.save(&run).await?;
            }
            Ok(StepOutcome::Paused { review_id, output }) => {
                run.mark_waiting(&step.id, output);
                shared.lock_suspended().insert(
                    run.id,
                    Suspension {
                        graph: graph.clone(),
                        context: context.clone(),
                        step_id: step.id.clone(),
                    },
                );
                shared.runs.save(&run).await?;
                tracing::info!(run_id = %run.id, step = %step.id, review_id = %review_id, "Run paused for review");
                return Ok(run);
            }
            Err(failure) => {
                run.mark_error(&step.id, &failure, Utc::now());
                shared.runs.save(&run).await?;
                tracing::warn!(run_id = %run.id, step = %step.id, error = %failure.error, "Run failed");
                return Ok(run);
            }
        }
    }

    run.complete(Utc::now());
    shared.runs.save(&run).await?;
    tracing::info!(run_id = %run.id, "Run completed");
    Ok(run)
}

/// Upstream outputs for `step_id`, keyed by source handle or source id.
///
/// Sources without a successful output contribute nothing. An edge whose
/// `sourceHandle` differs from the upstream `activeHandle` is a branch that
/// was not taken.
fn gather_inputs(graph: &WorkflowGraph, run: &Run, step_id: &str) -> Map<String, Value> {
    let mut input = Map::new();
    for edge in graph.inbound_edges(step_id) {
        let Some(output) = run.output_of(&edge.source) else {
            continue;
        };
        let active = output.get(ACTIVE_HANDLE).and_then(Value::as_str);
        if let (Some(active), Some(handle)) = (active, edge.source_handle.as_deref()) {
            if active != handle {
                continue;
            }
        }
        input.insert(edge.input_key().to_string(), output.clone());
    }
    input
}

fn next_index(graph: &WorkflowGraph, step_id: &str) -> EngineResult<usize> {
    let order = graph.topological_order()?;
    Ok(order
        .iter()
        .position(|s| s.id == step_id)
        .map_or(order.len(), |i| i + 1))
}
