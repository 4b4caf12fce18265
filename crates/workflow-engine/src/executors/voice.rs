use std::sync::Arc;

use async_trait::async_trait;
use clipflow_services::keys::user_asset_key;
use clipflow_services::{AudioFormat, VoiceRequest};
use serde_json::json;
use uuid::Uuid;

use super::{config_f64, config_str, lookup_str, ExecutorServices};
use crate::dispatch::{StepContext, StepExecutor, StepOutcome};
use crate::error::StepError;

/// Text-to-speech. The audio is stored under the user's asset root.
pub struct VoiceExecutor {
    services: Arc<ExecutorServices>,
}

impl VoiceExecutor {
    pub fn new(services: Arc<ExecutorServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StepExecutor for VoiceExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let synthesizer = self
            .services
            .voice
            .as_ref()
            .ok_or(StepError::NotConfigured("voice synthesis"))?;

        let text = config_str(ctx, "text")
            .or_else(|| lookup_str(ctx, "text"))
            .ok_or_else(|| StepError::MissingInput("text".into()))?;
        let voice_id = config_str(ctx, "voiceId").unwrap_or(&self.services.default_voice);

        let format = match config_str(ctx, "format") {
            Some(raw) => AudioFormat::parse(raw)
                .ok_or_else(|| StepError::InvalidConfig(format!("unknown audio format '{raw}'")))?,
            None => AudioFormat::default(),
        };

        let mut request = VoiceRequest::new(text, voice_id);
        request.format = format;
        request.stability = config_f64(ctx, "stability");
        request.similarity_boost = config_f64(ctx, "similarityBoost");
        request.speaking_rate = config_f64(ctx, "speakingRate");
        request.language = config_str(ctx, "language").map(str::to_string);

        let timeout = self.services.tts_timeout();
        let clip = tokio::time::timeout(timeout, synthesizer.synthesize(&request))
            .await
            .map_err(|_| StepError::Timeout(timeout))??;

        let key = user_asset_key(
            &ctx.user_id,
            &format!("voice/{}.{}", Uuid::new_v4(), format.extension()),
        );
        let size = clip.bytes.len();
        let stored = self
            .services
            .blobs
            .put(&key, clip.bytes, &clip.content_type)
            .await?;

        tracing::info!(step = %ctx.step_id, key = %stored.key, size_bytes = size, "Voiceover stored");
        Ok(StepOutcome::Completed(json!({
            "audioUrl": stored.url,
            "contentType": clip.content_type,
            "durationSec": clip.duration_sec,
            "voiceId": request.voice_id,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::test_support::context;
    use crate::graph::StepKind;
    use crate::review::InMemoryReviewStore;
    use bytes::Bytes;
    use clipflow_services::{
        BlobStore, InMemoryBlobStore, InMemoryProjectStore, ProviderError, StoreAssetFetcher,
        VoiceClip, VoiceSynthesizer,
    };
    use std::time::Duration;

    struct Tone;

    #[async_trait]
    impl VoiceSynthesizer for Tone {
        async fn synthesize(&self, request: &VoiceRequest) -> Result<VoiceClip, ProviderError> {
            Ok(VoiceClip {
                bytes: Bytes::from(request.text.clone()),
                content_type: request.format.content_type().to_string(),
                duration_sec: Some(2.0),
            })
        }
    }

    #[tokio::test]
    async fn test_voice_stored_under_user_assets() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let mut services = ExecutorServices::new(
            blobs.clone(),
            Arc::new(StoreAssetFetcher::new(blobs.clone(), Duration::from_secs(1))),
            Arc::new(InMemoryProjectStore::new()),
            Arc::new(InMemoryReviewStore::new()),
        );
        services.voice = Some(Arc::new(Tone));
        let exec = VoiceExecutor::new(Arc::new(services));

        let ctx = context(
            StepKind::Voice,
            json!({ "voiceId": "aria", "format": "wav" }),
            json!({ "script": { "text": "hello there" } }),
        );
        let StepOutcome::Completed(out) = exec.execute(&ctx).await.unwrap() else {
            panic!("voice never pauses");
        };
        assert_eq!(out["voiceId"], "aria");
        assert_eq!(out["contentType"], "audio/wav");

        let keys = blobs.keys_with_prefix("user-assets/user-1/voice/").await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with(".wav"));
        assert_eq!(blobs.get(&keys[0]).await.unwrap(), Bytes::from("hello there"));
    }

    #[tokio::test]
    async fn test_missing_text_rejected() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let mut services = ExecutorServices::new(
            blobs.clone(),
            Arc::new(StoreAssetFetcher::new(blobs, Duration::from_secs(1))),
            Arc::new(InMemoryProjectStore::new()),
            Arc::new(InMemoryReviewStore::new()),
        );
        services.voice = Some(Arc::new(Tone));
        let exec = VoiceExecutor::new(Arc::new(services));
        let ctx = context(StepKind::Voice, json!({}), json!({}));
        assert!(matches!(exec.execute(&ctx).await, Err(StepError::MissingInput(_))));
    }
}
