//! Speech synthesis.
//!
//! Two backends with different request shapes: a REST endpoint taking a JSON
//! body, and an SSML-over-REST endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clipflow_common::VoiceConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::provider::ProviderError;

/// Encoded audio container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Ogg => "audio/ogg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" | "mpeg" => Some(Self::Mp3),
            "wav" | "pcm" => Some(Self::Wav),
            "ogg" | "opus" => Some(Self::Ogg),
            _ => None,
        }
    }
}

/// What to say and how.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRequest {
    pub text: String,
    pub voice_id: String,
    pub format: AudioFormat,
    pub stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub speaking_rate: Option<f64>,
    pub language: Option<String>,
}

impl VoiceRequest {
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            format: AudioFormat::default(),
            stability: None,
            similarity_boost: None,
            speaking_rate: None,
            language: None,
        }
    }
}

/// Synthesized audio.
#[derive(Debug, Clone)]
pub struct VoiceClip {
    pub bytes: Bytes,
    pub content_type: String,
    pub duration_sec: Option<f64>,
}

/// Text-to-speech capability.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &VoiceRequest) -> Result<VoiceClip, ProviderError>;
}

/// REST backend: `POST {endpoint}/v1/text-to-speech/{voice}` with a JSON body.
pub struct RestJsonSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl RestJsonSynthesizer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn output_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Mp3 => "mp3_44100_128",
            AudioFormat::Wav => "pcm_44100",
            AudioFormat::Ogg => "opus_48000_64",
        }
    }

    pub(crate) fn request_body(request: &VoiceRequest) -> serde_json::Value {
        let mut settings = serde_json::Map::new();
        if let Some(stability) = request.stability {
            settings.insert("stability".into(), json!(stability));
        }
        if let Some(boost) = request.similarity_boost {
            settings.insert("similarity_boost".into(), json!(boost));
        }
        if let Some(rate) = request.speaking_rate {
            settings.insert("speed".into(), json!(rate));
        }

        let mut body = json!({ "text": request.text });
        if !settings.is_empty() {
            body["voice_settings"] = serde_json::Value::Object(settings);
        }
        if let Some(language) = &request.language {
            body["language_code"] = json!(language);
        }
        body
    }
}

#[async_trait]
impl VoiceSynthesizer for RestJsonSynthesizer {
    async fn synthesize(&self, request: &VoiceRequest) -> Result<VoiceClip, ProviderError> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.endpoint,
            request.voice_id,
            Self::output_format(request.format)
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        Ok(VoiceClip {
            bytes,
            content_type: request.format.content_type().to_string(),
            duration_sec: None,
        })
    }
}

/// SSML backend: `POST {endpoint}/cognitiveservices/v1` with an SSML document.
pub struct SsmlSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl SsmlSynthesizer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn output_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Mp3 => "audio-24khz-96kbitrate-mono-mp3",
            AudioFormat::Wav => "riff-24khz-16bit-mono-pcm",
            AudioFormat::Ogg => "ogg-24khz-16bit-mono-opus",
        }
    }

    pub(crate) fn ssml(request: &VoiceRequest) -> String {
        let language = request.language.as_deref().unwrap_or("en-US");
        let text = escape_xml(&request.text);
        let body = match request.speaking_rate {
            Some(rate) => format!("<prosody rate=\"{rate:.2}\">{text}</prosody>"),
            None => text,
        };
        format!(
            "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" xml:lang=\"{}\">\
             <voice name=\"{}\">{body}</voice></speak>",
            escape_xml(language),
            escape_xml(&request.voice_id),
        )
    }
}

#[async_trait]
impl VoiceSynthesizer for SsmlSynthesizer {
    async fn synthesize(&self, request: &VoiceRequest) -> Result<VoiceClip, ProviderError> {
        let url = format!("{}/cognitiveservices/v1", self.endpoint);

        let response = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", Self::output_format(request.format))
            .body(Self::ssml(request))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        Ok(VoiceClip {
            bytes,
            content_type: request.format.content_type().to_string(),
            duration_sec: None,
        })
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Build the configured synthesizer. `Ok(None)` when no provider is set.
pub fn synthesizer_from_config(
    config: &VoiceConfig,
    timeout: Duration,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<Option<Arc<dyn VoiceSynthesizer>>, ProviderError> {
    let Some(provider) = config.provider.as_deref() else {
        return Ok(None);
    };

    let api_key = lookup_env(&config.api_key_env)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::NotConfigured(format!("{} is not set", config.api_key_env)))?;
    if config.endpoint.trim().is_empty() {
        return Err(ProviderError::NotConfigured("voice.endpoint is empty".into()));
    }

    let synthesizer: Arc<dyn VoiceSynthesizer> = match provider {
        "rest_json" => Arc::new(RestJsonSynthesizer::new(&config.endpoint, api_key, timeout)),
        "ssml" => Arc::new(SsmlSynthesizer::new(&config.endpoint, api_key, timeout)),
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown voice provider '{other}'"
            )))
        }
    };
    Ok(Some(synthesizer))
}
