use std::sync::Arc;

use async_trait::async_trait;
use clipflow_services::TextRequest;
use serde_json::json;

use super::{as_text, config_f64, config_str, pass_through, render_template, ExecutorServices};
use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;

/// Language-model call with `{{...}}` prompt templating.
pub struct AiExecutor {
    services: Arc<ExecutorServices>,
}

impl AiExecutor {
    pub fn new(services: Arc<ExecutorServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StepExecutor for AiExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let generator = self
            .services
            .text
            .as_ref()
            .ok_or(StepError::NotConfigured("text generation"))?;

        let prompt = match config_str(ctx, "prompt") {
            Some(template) => render_template(template, ctx),
            None => as_text(&pass_through(ctx)),
        };
        if prompt.trim().is_empty() {
            return Err(StepError::MissingInput("prompt".into()));
        }

        let mut request = TextRequest::new(prompt.clone());
        request.system = config_str(ctx, "systemPrompt").map(str::to_string);
        request.model = config_str(ctx, "model").map(str::to_string);
        request.temperature = config_f64(ctx, "temperature");
        request.max_tokens = config_f64(ctx, "maxTokens").map(|n| n.max(1.0) as u32);

        let timeout = self.services.llm_timeout();
        let text = tokio::time::timeout(timeout, generator.generate(&request))
            .await
            .map_err(|_| StepError::Timeout(timeout))??;

        tracing::debug!(step = %ctx.step_id, chars = text.len(), "Text generated");
        Ok(StepOutcome::Completed(json!({
            "text": text,
            "prompt": prompt,
            "model": request.model,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::test_support::context;
    use crate::graph::StepKind;
    use clipflow_services::{
        InMemoryBlobStore, InMemoryProjectStore, ProviderError, StoreAssetFetcher, TextGenerator,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::review::InMemoryReviewStore;

    struct Echo(Mutex<Vec<String>>);

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, request: &TextRequest) -> Result<String, ProviderError> {
            self.0.lock().unwrap().push(request.prompt.clone());
            Ok(format!("echo: {}", request.prompt))
        }
    }

    struct Throttled;

    #[async_trait]
    impl TextGenerator for Throttled {
        async fn generate(&self, _: &TextRequest) -> Result<String, ProviderError> {
            Err(ProviderError::RateLimited("429 from upstream-42".into()))
        }
    }

    fn services(text: Option<Arc<dyn TextGenerator>>) -> Arc<ExecutorServices> {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let mut services = ExecutorServices::new(
            blobs.clone(),
            Arc::new(StoreAssetFetcher::new(blobs, Duration::from_secs(1))),
            Arc::new(InMemoryProjectStore::new()),
            Arc::new(InMemoryReviewStore::new()),
        );
        services.text = text;
        Arc::new(services)
    }

    #[tokio::test]
    async fn test_prompt_template_filled_from_input() {
        let echo = Arc::new(Echo(Mutex::new(Vec::new())));
        let exec = AiExecutor::new(services(Some(echo.clone())));
        let ctx = context(
            StepKind::Ai,
            json!({ "prompt": "Script about {{topic}}" }),
            json!({ "trigger": { "topic": "tea" } }),
        );
        let StepOutcome::Completed(out) = exec.execute(&ctx).await.unwrap() else {
            panic!("ai never pauses");
        };
        assert_eq!(out["text"], "echo: Script about tea");
        assert_eq!(*echo.0.lock().unwrap(), vec!["Script about tea".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_generator_is_not_configured() {
        let exec = AiExecutor::new(services(None));
        let ctx = context(StepKind::Ai, json!({ "prompt": "hi" }), json!({}));
        assert!(matches!(
            exec.execute(&ctx).await,
            Err(StepError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_error_surfaces() {
        let exec = AiExecutor::new(services(Some(Arc::new(Throttled))));
        let ctx = context(StepKind::Ai, json!({ "prompt": "hi" }), json!({}));
        let err = exec.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, StepError::Provider(ProviderError::RateLimited(_))));
    }
}
