//! Utility steps: variables, outbound HTTP, notifications and logging.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{config_str, merged_input, pass_through, render_template, ExecutorServices};
use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;
use crate::graph::{StepKind, UtilityKind};

pub struct UtilityExecutor {
    services: Arc<ExecutorServices>,
}

impl UtilityExecutor {
    pub fn new(services: Arc<ExecutorServices>) -> Self {
        Self { services }
    }

    fn set_variable(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let mut output = merged_input(ctx);
        match (ctx.config.get("variables"), config_str(ctx, "name")) {
            (Some(Value::Object(vars)), _) => {
                output.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            (_, Some(name)) => {
                let value = ctx.config.get("value").cloned().unwrap_or(Value::Null);
                output.insert(name.to_string(), value);
            }
            _ => {
                return Err(StepError::InvalidConfig(
                    "set_variable needs `name` or `variables`".into(),
                ))
            }
        }
        Ok(StepOutcome::Completed(Value::Object(output)))
    }

    #[tracing::instrument(skip_all, fields(step = %ctx.step_id))]
    async fn http_request(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let url = config_str(ctx, "url")
            .map(|u| render_template(u, ctx))
            .ok_or_else(|| StepError::MissingInput("url".into()))?;
        let method = config_str(ctx, "method").unwrap_or("GET").to_ascii_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| StepError::InvalidConfig(format!("unsupported HTTP method '{method}'")))?;

        let timeout = self.services.http_timeout();
        let mut request = self
            .services
            .http
            .request(method.clone(), &url)
            .timeout(timeout);
        if let Some(Value::Object(headers)) = ctx.config.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }
        match ctx.config.get("body") {
            Some(Value::String(body)) => request = request.body(render_template(body, ctx)),
            Some(body) if !body.is_null() => request = request.json(body),
            _ => {}
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StepError::Timeout(timeout)
            } else {
                StepError::Http(e.to_string())
            }
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StepError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(StepError::Http(format!("{method} {url} returned {status}")));
        }

        tracing::debug!(%method, %url, status = status.as_u16(), "HTTP step finished");
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(StepOutcome::Completed(json!({
            "status": status.as_u16(),
            "body": body,
        })))
    }

    fn notification(&self, ctx: &StepContext) -> StepOutcome {
        let channel = config_str(ctx, "channel").unwrap_or("email");
        let message = config_str(ctx, "message")
            .map(|m| render_template(m, ctx))
            .unwrap_or_else(|| format!("Workflow step {} finished", ctx.step_id));
        tracing::info!(
            step = %ctx.step_id,
            channel,
            recipient = config_str(ctx, "to").unwrap_or_default(),
            message = %message,
            "Simulated notification"
        );
        StepOutcome::Completed(json!({
            "notified": true,
            "simulated": true,
            "channel": channel,
            "message": message,
        }))
    }

    fn logger(&self, ctx: &StepContext) -> StepOutcome {
        let data = pass_through(ctx);
        let label = config_str(ctx, "message").unwrap_or("workflow log");
        tracing::info!(step = %ctx.step_id, run_id = %ctx.run_id, data = %data, "{label}");
        StepOutcome::Completed(data)
    }
}

#[async_trait]
impl StepExecutor for UtilityExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match ctx.kind {
            StepKind::Utility(UtilityKind::SetVariable) => self.set_variable(ctx),
            StepKind::Utility(UtilityKind::HttpRequest) => self.http_request(ctx).await,
            StepKind::Utility(UtilityKind::Notification) => Ok(self.notification(ctx)),
            StepKind::Utility(UtilityKind::Logger) => Ok(self.logger(ctx)),
            _ => Ok(StepOutcome::Completed(pass_through(ctx))),
        }
    }
}
