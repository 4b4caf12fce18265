//! Text generation through an OpenAI-compatible chat-completions API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clipflow_common::TextConfig;
use serde::Deserialize;
use serde_json::json;

use crate::provider::ProviderError;

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Language-model capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &TextRequest) -> Result<String, ProviderError>;
}

/// `POST {base_url}/chat/completions` with bearer auth.
pub struct OpenAiCompatibleGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            timeout,
        }
    }

    pub(crate) fn request_body(&self, request: &TextRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.default_model),
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: &TextRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no completion returned".into()))
    }
}

/// Build the configured generator. `Ok(None)` when no base URL is set.
pub fn generator_from_config(
    config: &TextConfig,
    timeout: Duration,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<Option<Arc<dyn TextGenerator>>, ProviderError> {
    let Some(base_url) = config.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };
    let api_key = lookup_env(&config.api_key_env)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::NotConfigured(format!("{} is not set", config.api_key_env)))?;
    Ok(Some(Arc::new(OpenAiCompatibleGenerator::new(
        base_url,
        api_key,
        &config.default_model,
        timeout,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let generator = OpenAiCompatibleGenerator::new(
            "https://llm.example.com/v1/",
            "key",
            "small-model",
            Duration::from_secs(5),
        );
        let mut request = TextRequest::new("Write a hook");
        request.system = Some("You write short video scripts.".into());
        request.temperature = Some(0.7);

        let body = generator.request_body(&request);
        assert_eq!(body["model"], "small-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Write a hook");
        assert_eq!(body["temperature"], json!(0.7));
        assert!(body.get("max_tokens").is_none());
        assert_eq!(generator.base_url, "https://llm.example.com/v1");
    }

    #[test]
    fn test_generator_from_config() {
        let mut config = TextConfig::default();
        assert!(generator_from_config(&config, Duration::from_secs(1), |_| None)
            .unwrap()
            .is_none());

        config.base_url = Some("https://llm.example.com/v1".into());
        assert!(matches!(
            generator_from_config(&config, Duration::from_secs(1), |_| None),
            Err(ProviderError::NotConfigured(_))
        ));
        let built = generator_from_config(&config, Duration::from_secs(1), |key| {
            (key == "CLIPFLOW_LLM_API_KEY").then(|| "secret".to_string())
        })
        .unwrap();
        assert!(built.is_some());
    }
}
