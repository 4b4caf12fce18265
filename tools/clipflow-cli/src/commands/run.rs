//! Execute a workflow graph against local storage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clipflow_common::AppConfig;
use clipflow_render_engine::{FfmpegEncoder, RenderOrchestrator, RenderSettings};
use clipflow_render_queue::{RenderDeps, RenderQueue};
use clipflow_services::{generator_from_config, synthesizer_from_config, InMemoryProjectStore};
use clipflow_workflow::{
    ExecutorServices, InMemoryReviewStore, InMemoryRunStore, InitialContext, Resolution,
    ReviewStore, Run, RunStatus, WorkflowEngine, WorkflowGraph,
};
use serde_json::Value;
use uuid::Uuid;

use super::local_storage;

pub async fn run(
    config: &AppConfig,
    graph_path: PathBuf,
    user: String,
    payload: Option<String>,
    approve: bool,
) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&graph_path)
        .with_context(|| format!("Failed to read {}", graph_path.display()))?;
    let graph = WorkflowGraph::from_json(&json)?;
    let payload = match payload {
        Some(raw) => serde_json::from_str(&raw).context("--payload is not valid JSON")?,
        None => Value::Null,
    };

    let (blobs, fetcher) = local_storage(config).await?;
    let projects = Arc::new(InMemoryProjectStore::new());
    let orchestrator = Arc::new(RenderOrchestrator::new(
        Arc::new(FfmpegEncoder::new(&config.render.ffmpeg_path)),
        fetcher.clone(),
        RenderSettings::from(&config.render),
    ));
    let queue = Arc::new(RenderQueue::from_config(
        config,
        RenderDeps {
            orchestrator: orchestrator.clone(),
            fetcher: fetcher.clone(),
            blobs: blobs.clone(),
            projects: projects.clone(),
        },
    )?);

    let reviews = Arc::new(InMemoryReviewStore::new());
    let mut services = ExecutorServices::new(blobs, fetcher, projects, reviews.clone());
    services.orchestrator = Some(orchestrator);
    services.render_queue = Some(queue.clone());
    services.limits = config.engine.clone();
    services.default_voice = config.voice.default_voice.clone();
    services.voice = synthesizer_from_config(
        &config.voice,
        Duration::from_secs(config.engine.tts_timeout_secs),
        |key| std::env::var(key).ok(),
    )
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Voice provider unavailable");
        None
    });
    services.text = generator_from_config(
        &config.text,
        Duration::from_secs(config.engine.llm_timeout_secs),
        |key| std::env::var(key).ok(),
    )
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Text provider unavailable");
        None
    });

    let engine = WorkflowEngine::new(services, Arc::new(InMemoryRunStore::new()));
    let context = InitialContext::new(user).with_payload(payload);
    let mut run = engine.execute(graph, context).await?.wait().await?;

    while run.status == RunStatus::Paused {
        match settle_pause(&engine, reviews.as_ref(), &run, approve).await? {
            Some(resumed) => run = resumed,
            None => break,
        }
    }

    for project_id in submitted_renders(&run.steps) {
        if let Some(status) = queue.wait(project_id).await {
            eprintln!("Draft render for {project_id}: {:?}", status.status);
        }
    }

    println!("{}", serde_json::to_string_pretty(&run)?);
    match run.status {
        RunStatus::Failed => anyhow::bail!(
            "Run failed: {}",
            run.error.as_deref().unwrap_or("unknown error")
        ),
        RunStatus::Paused => {
            eprintln!("Run is paused for review; pass --approve to continue past review gates without a timeout.");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Move a paused run past its review gate.
///
/// With `approve` the gate is approved at once. Otherwise a gate with a
/// `timeoutSec` expiry is waited out and auto-approved. `None` when the run
/// has to stay paused.
async fn settle_pause(
    engine: &WorkflowEngine,
    reviews: &dyn ReviewStore,
    run: &Run,
    approve: bool,
) -> anyhow::Result<Option<Run>> {
    let Some(step) = run.waiting_step().map(str::to_string) else {
        return Ok(None);
    };
    if approve {
        eprintln!("Approving review gate '{step}'");
        let handle = engine.resolve_review(run.id, &step, Resolution::Approve).await?;
        return Ok(Some(handle.wait().await?));
    }

    let Some(expires_at) = reviews.get(run.id, &step).await?.and_then(|s| s.expires_at) else {
        return Ok(None);
    };
    let remaining = (expires_at - Utc::now()).to_std().unwrap_or_default();
    eprintln!(
        "Review gate '{step}' auto-approves in {:.0}s",
        remaining.as_secs_f64().ceil()
    );
    tokio::time::sleep(remaining).await;

    let resumed = engine.expire_reviews(expires_at.max(Utc::now())).await?;
    match resumed.into_iter().find(|h| h.run_id() == run.id) {
        Some(handle) => Ok(Some(handle.wait().await?)),
        None => Ok(None),
    }
}

/// Projects whose draft render was queued by an auto-edit step.
fn submitted_renders(steps: &[clipflow_workflow::StepLog]) -> Vec<Uuid> {
    steps
        .iter()
        .filter_map(|log| log.output.as_ref())
        .filter(|out| out.get("renderStatus").is_some_and(|s| !s.is_null()))
        .filter_map(|out| out.get("projectId")?.as_str()?.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipflow_services::{InMemoryBlobStore, StoreAssetFetcher};
    use serde_json::json;

    fn gate_engine() -> (WorkflowEngine, Arc<InMemoryReviewStore>) {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let fetcher = Arc::new(StoreAssetFetcher::new(blobs.clone(), Duration::from_secs(1)));
        let reviews = Arc::new(InMemoryReviewStore::new());
        let services = ExecutorServices::new(
            blobs,
            fetcher,
            Arc::new(InMemoryProjectStore::new()),
            reviews.clone(),
        );
        (
            WorkflowEngine::new(services, Arc::new(InMemoryRunStore::new())),
            reviews,
        )
    }

    fn gate_graph(config: Value) -> WorkflowGraph {
        serde_json::from_value(json!({
            "id": "wf-gate",
            "steps": [
                { "id": "start", "category": "trigger", "type": "manual" },
                { "id": "gate", "category": "review", "type": "approval_gate", "config": config }
            ],
            "edges": [{ "source": "start", "target": "gate" }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_timed_gate_is_waited_out() {
        let (engine, reviews) = gate_engine();
        let paused = engine
            .execute(gate_graph(json!({ "timeoutSec": 1 })), InitialContext::new("local"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(paused.status, RunStatus::Paused);

        let run = settle_pause(&engine, reviews.as_ref(), &paused, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.output_of("gate").unwrap()["decision"], "approve");
    }

    #[tokio::test]
    async fn test_gate_without_timeout_stays_paused() {
        let (engine, reviews) = gate_engine();
        let paused = engine
            .execute(gate_graph(json!({})), InitialContext::new("local"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert!(settle_pause(&engine, reviews.as_ref(), &paused, false)
            .await
            .unwrap()
            .is_none());
        let approved = settle_pause(&engine, reviews.as_ref(), &paused, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.status, RunStatus::Completed);
    }
}
