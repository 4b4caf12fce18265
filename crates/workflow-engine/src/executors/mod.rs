//! Step executors, one per category.

mod ai;
mod logic;
mod review;
mod social;
mod trigger;
mod utility;
mod video;
mod voice;

pub use ai::AiExecutor;
pub use logic::{LogicExecutor, ACTIVE_HANDLE};
pub use review::{resolved_gate_output, ReviewExecutor, ReviewMode};
pub use social::SocialExecutor;
pub use trigger::TriggerExecutor;
pub use utility::UtilityExecutor;
pub use video::VideoExecutor;
pub use voice::VoiceExecutor;

use std::sync::Arc;
use std::time::Duration;

use clipflow_common::EngineConfig;
use clipflow_render_engine::RenderOrchestrator;
use clipflow_render_queue::RenderQueue;
use clipflow_services::{AssetFetcher, BlobStore, ProjectStore, TextGenerator, VoiceSynthesizer};
use serde_json::{Map, Value};

use crate::dispatch::StepContext;
use crate::error::StepError;
use crate::review::ReviewStore;

/// Collaborators shared by the default executors.
#[derive(Clone)]
pub struct ExecutorServices {
    pub blobs: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub projects: Arc<dyn ProjectStore>,
    pub reviews: Arc<dyn ReviewStore>,
    /// Used by `video.render_final`.
    pub orchestrator: Option<Arc<RenderOrchestrator>>,
    /// Used by `video.auto_edit` to kick off the draft render.
    pub render_queue: Option<Arc<RenderQueue>>,
    pub text: Option<Arc<dyn TextGenerator>>,
    pub voice: Option<Arc<dyn VoiceSynthesizer>>,
    pub default_voice: String,
    pub http: reqwest::Client,
    pub limits: EngineConfig,
}

impl ExecutorServices {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        fetcher: Arc<dyn AssetFetcher>,
        projects: Arc<dyn ProjectStore>,
        reviews: Arc<dyn ReviewStore>,
    ) -> Self {
        Self {
            blobs,
            fetcher,
            projects,
            reviews,
            orchestrator: None,
            render_queue: None,
            text: None,
            voice: None,
            default_voice: "narrator".to_string(),
            http: reqwest::Client::new(),
            limits: EngineConfig::default(),
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.llm_timeout_secs)
    }

    pub fn tts_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.tts_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.http_timeout_secs)
    }
}

pub(crate) fn config_str<'a>(ctx: &'a StepContext, key: &str) -> Option<&'a str> {
    ctx.config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn config_f64(ctx: &StepContext, key: &str) -> Option<f64> {
    ctx.config.get(key).and_then(number)
}

/// Numbers are accepted as JSON numbers or numeric strings.
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Upstream object fields merged into one map, later inputs winning.
/// Non-object inputs appear under their input key.
pub(crate) fn merged_input(ctx: &StepContext) -> Map<String, Value> {
    let mut merged = Map::new();
    for (key, value) in &ctx.input {
        match value {
            Value::Object(fields) => {
                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            other => {
                merged.insert(key.clone(), other.clone());
            }
        }
    }
    merged
}

/// First upstream field named `key`, falling back to the step config.
pub(crate) fn lookup<'a>(ctx: &'a StepContext, key: &str) -> Option<&'a Value> {
    ctx.input
        .values()
        .filter_map(Value::as_object)
        .find_map(|fields| fields.get(key))
        .or_else(|| ctx.input.get(key))
        .or_else(|| ctx.config.get(key))
        .filter(|v| !v.is_null())
}

pub(crate) fn lookup_str<'a>(ctx: &'a StepContext, key: &str) -> Option<&'a str> {
    lookup(ctx, key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn require_str<'a>(ctx: &'a StepContext, key: &str) -> Result<&'a str, StepError> {
    lookup_str(ctx, key).ok_or_else(|| StepError::MissingInput(key.to_string()))
}

/// The single upstream value, or every input keyed by handle.
pub(crate) fn pass_through(ctx: &StepContext) -> Value {
    if ctx.input.len() == 1 {
        ctx.input.values().next().cloned().unwrap_or(Value::Null)
    } else {
        Value::Object(ctx.input.clone())
    }
}

/// Text form of a value for prompt templates: strings stay raw.
pub(crate) fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Replace `{{input}}` with the upstream data and `{{name}}` with an upstream field.
/// Unknown placeholders are left as written.
pub(crate) fn render_template(template: &str, ctx: &StepContext) -> String {
    let merged = merged_input(ctx);
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = after[..close].trim();
        match name {
            "input" => out.push_str(&as_text(&pass_through(ctx))),
            field => match merged.get(field) {
                Some(value) => out.push_str(&as_text(value)),
                None => out.push_str(&rest[open..open + 2 + close + 2]),
            },
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}
