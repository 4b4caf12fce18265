//! Flow-control steps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{as_text, config_f64, config_str, lookup, merged_input, number, pass_through, ExecutorServices};
use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;
use crate::graph::{LogicKind, StepKind};

/// Output field naming the branch a conditional took.
pub const ACTIVE_HANDLE: &str = "activeHandle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    Exists,
}

impl Operator {
    fn parse(raw: &str) -> Result<Self, StepError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "equals" | "eq" | "==" => Ok(Self::Equals),
            "not_equals" | "ne" | "!=" => Ok(Self::NotEquals),
            "contains" => Ok(Self::Contains),
            "greater_than" | "gt" | ">" => Ok(Self::GreaterThan),
            "less_than" | "lt" | "<" => Ok(Self::LessThan),
            "exists" => Ok(Self::Exists),
            other => Err(StepError::InvalidConfig(format!("unknown operator '{other}'"))),
        }
    }

    fn evaluate(self, actual: Option<&Value>, expected: &Value) -> bool {
        let Some(actual) = actual.filter(|v| !v.is_null()) else {
            return self == Self::NotEquals && !expected.is_null();
        };
        match self {
            Self::Exists => true,
            Self::Equals => loosely_equal(actual, expected),
            Self::NotEquals => !loosely_equal(actual, expected),
            Self::Contains => match actual {
                Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
                other => as_text(other).contains(&as_text(expected)),
            },
            Self::GreaterThan => compare(actual, expected).is_some_and(|o| o.is_gt()),
            Self::LessThan => compare(actual, expected).is_some_and(|o| o.is_lt()),
        }
    }
}

/// Numbers compare numerically even when one side is a numeric string.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b || as_text(a) == as_text(b),
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    number(a)?.partial_cmp(&number(b)?)
}

/// Resolve `a.b.c` against the merged upstream fields, then against input keys.
fn field_value<'a>(merged: &'a Map<String, Value>, input: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').filter(|s| !s.is_empty());
    let first = segments.next()?;
    let root = merged.get(first).or_else(|| input.get(first))?;
    segments.try_fold(root, |value, segment| match value {
        Value::Object(fields) => fields.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub struct LogicExecutor {
    services: Arc<ExecutorServices>,
}

impl LogicExecutor {
    pub fn new(services: Arc<ExecutorServices>) -> Self {
        Self { services }
    }

    fn conditional(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let field = config_str(ctx, "field")
            .ok_or_else(|| StepError::InvalidConfig("conditional needs a field".into()))?;
        let operator = Operator::parse(config_str(ctx, "operator").unwrap_or("equals"))?;
        let expected = ctx.config.get("value").cloned().unwrap_or(Value::Null);

        let merged = merged_input(ctx);
        let actual = field_value(&merged, &ctx.input, field);
        let result = operator.evaluate(actual, &expected);
        tracing::debug!(step = %ctx.step_id, field, ?operator, result, "Condition evaluated");

        let mut output = Map::new();
        output.insert(ACTIVE_HANDLE.into(), json!(if result { "true" } else { "false" }));
        output.insert("result".into(), json!(result));
        output.insert("data".into(), Value::Object(merged));
        Ok(StepOutcome::Completed(Value::Object(output)))
    }

    async fn delay(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let requested = config_f64(ctx, "seconds")
            .or_else(|| config_f64(ctx, "durationSec"))
            .unwrap_or(0.0)
            .max(0.0);
        let cap = self.services.limits.max_delay_secs as f64;
        let secs = requested.min(cap);
        if requested > cap {
            tracing::warn!(step = %ctx.step_id, requested, cap, "Delay capped");
        }
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        Ok(StepOutcome::Completed(pass_through(ctx)))
    }

    fn each(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let items = match lookup(ctx, "items") {
            Some(Value::Array(items)) => items.clone(),
            _ => match pass_through(ctx) {
                Value::Array(items) => items,
                Value::Object(fields) if fields.is_empty() => Vec::new(),
                other => vec![other],
            },
        };
        Ok(StepOutcome::Completed(json!({
            "count": items.len(),
            "items": items,
        })))
    }
}

#[async_trait]
impl StepExecutor for LogicExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match ctx.kind {
            StepKind::Logic(LogicKind::Conditional) => self.conditional(ctx),
            StepKind::Logic(LogicKind::Delay) => self.delay(ctx).await,
            StepKind::Logic(LogicKind::Loop) => self.each(ctx),
            StepKind::Logic(LogicKind::Merge) => {
                Ok(StepOutcome::Completed(Value::Object(merged_input(ctx))))
            }
            _ => Ok(StepOutcome::Completed(pass_through(ctx))),
        }
    }
}
