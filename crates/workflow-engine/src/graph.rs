//! Workflow graph model and scheduling order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GraphError;

/// Step category. Selects which executor runs the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepCategory {
    Trigger,
    Ai,
    Voice,
    Video,
    Review,
    Social,
    Logic,
    Utility,
}

impl StepCategory {
    pub const ALL: [StepCategory; 8] = [
        Self::Trigger,
        Self::Ai,
        Self::Voice,
        Self::Video,
        Self::Review,
        Self::Social,
        Self::Logic,
        Self::Utility,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Ai => "ai",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Review => "review",
            Self::Social => "social",
            Self::Logic => "logic",
            Self::Utility => "utility",
        }
    }
}

impl FromStr for StepCategory {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| GraphError::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoKind {
    AutoEdit,
    RenderFinal,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewKind {
    ApprovalGate,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicKind {
    Conditional,
    Delay,
    Loop,
    Merge,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtilityKind {
    SetVariable,
    HttpRequest,
    Notification,
    Logger,
    PassThrough,
}

/// What a step does, resolved from its category and type once at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Trigger,
    Ai,
    Voice,
    Video(VideoKind),
    Review(ReviewKind),
    Social,
    Logic(LogicKind),
    Utility(UtilityKind),
}

impl StepKind {
    /// Resolve a `(category, type)` pair. Unknown types fall into the
    /// category's catch-all; unknown categories are an error.
    pub fn resolve(category: &str, step_type: &str) -> Result<Self, GraphError> {
        let category: StepCategory = category.parse()?;
        let step_type = step_type.trim().to_ascii_lowercase().replace('-', "_");
        let step_type = step_type
            .strip_prefix(category.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(&step_type);

        Ok(match category {
            StepCategory::Trigger => Self::Trigger,
            StepCategory::Ai => Self::Ai,
            StepCategory::Voice => Self::Voice,
            StepCategory::Social => Self::Social,
            StepCategory::Video => Self::Video(match step_type {
                "auto_edit" => VideoKind::AutoEdit,
                "render_final" => VideoKind::RenderFinal,
                _ => VideoKind::Other,
            }),
            StepCategory::Review => Self::Review(match step_type {
                "approval_gate" => ReviewKind::ApprovalGate,
                _ => ReviewKind::Other,
            }),
            StepCategory::Logic => Self::Logic(match step_type {
                "conditional" | "condition" | "if" => LogicKind::Conditional,
                "delay" | "wait" => LogicKind::Delay,
                "loop" => LogicKind::Loop,
                "merge" => LogicKind::Merge,
                _ => LogicKind::Other,
            }),
            StepCategory::Utility => Self::Utility(match step_type {
                "set_variable" => UtilityKind::SetVariable,
                "http_request" | "http" => UtilityKind::HttpRequest,
                "notification" | "notify" => UtilityKind::Notification,
                "logger" | "log" => UtilityKind::Logger,
                _ => UtilityKind::PassThrough,
            }),
        })
    }

    pub fn category(self) -> StepCategory {
        match self {
            Self::Trigger => StepCategory::Trigger,
            Self::Ai => StepCategory::Ai,
            Self::Voice => StepCategory::Voice,
            Self::Video(_) => StepCategory::Video,
            Self::Review(_) => StepCategory::Review,
            Self::Social => StepCategory::Social,
            Self::Logic(_) => StepCategory::Logic,
            Self::Utility(_) => StepCategory::Utility,
        }
    }
}

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct Step {
    pub id: String,
    pub title: Option<String>,
    /// Type name as written in the graph.
    pub step_type: String,
    pub kind: StepKind,
    pub config: Map<String, Value>,
    pub disabled: bool,
}

impl Step {
    /// `category.type`, as recorded on step logs.
    pub fn qualified_type(&self) -> String {
        format!("{}.{}", self.kind.category(), self.step_type)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    category: String,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default)]
    config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    disabled: bool,
}

impl TryFrom<RawStep> for Step {
    type Error = GraphError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let kind = StepKind::resolve(&raw.category, &raw.step_type)?;
        Ok(Self {
            id: raw.id,
            title: raw.title,
            step_type: raw.step_type,
            kind,
            config: raw.config,
            disabled: raw.disabled,
        })
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        Self {
            id: step.id,
            title: step.title,
            category: step.kind.category().to_string(),
            step_type: step.step_type,
            config: step.config,
            disabled: step.disabled,
        }
    }
}

/// A directed connection between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Key under which the target sees this edge's input.
    pub fn input_key(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(&self.source)
    }
}

/// A workflow: steps plus the edges between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub id: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Parse and validate graph JSON.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let graph: Self = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Check step ids are unique and every edge endpoint exists.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(GraphError::DuplicateStep(step.id.clone()));
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(GraphError::UnknownStep {
                        from: edge.source.clone(),
                        to: edge.target.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    fn is_enabled(&self, id: &str) -> bool {
        self.step(id).is_some_and(|s| !s.disabled)
    }

    /// Edges into `step_id` whose source is enabled, in declaration order.
    pub fn inbound_edges<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.target == step_id && self.is_enabled(&e.source))
    }

    /// Kahn's algorithm over the enabled steps.
    ///
    /// Disabled steps and every edge touching them are ignored. Ready steps
    /// are taken first-in first-out, seeded in declaration order. Steps left
    /// with incoming edges are reported as a cycle.
    pub fn topological_order(&self) -> Result<Vec<&Step>, GraphError> {
        let enabled: Vec<&Step> = self.steps.iter().filter(|s| !s.disabled).collect();
        let enabled_ids: HashSet<&str> = enabled.iter().map(|s| s.id.as_str()).collect();

        let mut in_degree: HashMap<&str, usize> =
            enabled.iter().map(|s| (s.id.as_str(), 0)).collect();
        let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            let (source, target) = (edge.source.as_str(), edge.target.as_str());
            if enabled_ids.contains(source) && enabled_ids.contains(target) {
                outgoing.entry(source).or_default().push(target);
                *in_degree.entry(target).or_default() += 1;
            }
        }

        let mut ready: VecDeque<&str> = enabled
            .iter()
            .map(|s| s.id.as_str())
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();
        let mut order = Vec::with_capacity(enabled.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &next in outgoing.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(next);
                    }
                }
            }
        }

        if order.len() < enabled.len() {
            let scheduled: HashSet<&str> = order.iter().copied().collect();
            let steps = enabled
                .iter()
                .filter(|s| !scheduled.contains(s.id.as_str()))
                .map(|s| s.id.clone())
                .collect();
            return Err(GraphError::Cycle { steps });
        }

        Ok(order
            .into_iter()
            .filter_map(|id| enabled.iter().copied().find(|s| s.id == id))
            .collect())
    }
}
