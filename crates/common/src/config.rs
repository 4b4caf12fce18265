//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Blob storage settings.
    pub storage: StorageConfig,

    /// Render pipeline settings.
    pub render: RenderConfig,

    /// Render job queue settings.
    pub queue: QueueConfig,

    /// Workflow engine limits and timeouts.
    pub engine: EngineConfig,

    /// Voice synthesis provider.
    pub voice: VoiceConfig,

    /// Text generation provider.
    pub text: TextConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the local blob store.
    pub root: PathBuf,

    /// Lifetime of presigned URLs handed to clients.
    pub presign_ttl_secs: u64,
}

/// Render pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Encoder binary (resolved through PATH when not absolute).
    pub ffmpeg_path: String,

    /// Video bitrate for draft renders, in kbps.
    pub draft_video_bitrate_kbps: u32,

    /// Video bitrate for final renders, in kbps.
    pub final_video_bitrate_kbps: u32,

    /// Audio bitrate, in kbps.
    pub audio_bitrate_kbps: u32,

    /// Shortest segment the trim stage will emit, in seconds.
    pub min_segment_secs: f64,

    /// Minimum wall-clock spacing between preview frames, in milliseconds.
    pub preview_interval_ms: u64,
}

/// Render job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Broker connection. When unset, renders run in-process.
    pub broker_url: Option<String>,

    /// Worker pool size in broker mode.
    pub concurrency: usize,

    /// Attempts per job before it is marked failed.
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff, in milliseconds.
    pub backoff_base_ms: u64,

    /// Substitute a placeholder video when a render fails.
    pub degrade_on_failure: bool,
}

/// Workflow engine limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Runs allowed to drive steps at the same time.
    pub max_concurrent_runs: usize,

    /// Upper cap for the delay node, in seconds.
    pub max_delay_secs: u64,

    /// Timeout for language-model calls.
    pub llm_timeout_secs: u64,

    /// Timeout for speech synthesis calls.
    pub tts_timeout_secs: u64,

    /// Timeout for the HTTP request node and remote asset fetches.
    pub http_timeout_secs: u64,
}

/// Voice synthesis provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Backend kind: `rest_json` or `ssml`. None disables the voice node.
    pub provider: Option<String>,

    /// Provider base URL.
    pub endpoint: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Voice used when a step does not name one.
    pub default_voice: String,
}

/// OpenAI-compatible chat completions endpoint for the AI node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Base URL (`.../v1`). None disables the AI node.
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Model used when a step does not name one.
    pub default_model: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clipflow=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: dirs_default_storage(),
            presign_ttl_secs: 3600,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            draft_video_bitrate_kbps: 2500,
            final_video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
            min_segment_secs: 0.1,
            preview_interval_ms: 800,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            broker_url: None,
            concurrency: 2,
            max_attempts: 2,
            backoff_base_ms: 5000,
            degrade_on_failure: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 5,
            max_delay_secs: 300,
            llm_timeout_secs: 60,
            tts_timeout_secs: 60,
            http_timeout_secs: 30,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            provider: None,
            endpoint: String::new(),
            api_key_env: "CLIPFLOW_VOICE_API_KEY".to_string(),
            default_voice: "narrator".to_string(),
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "CLIPFLOW_LLM_API_KEY".to_string(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults,
    /// then apply environment overrides.
    pub fn load() -> Self {
        let config_path = config_file_path();
        let mut config = Self::default();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(parsed) => config = parsed,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Apply `CLIPFLOW_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CLIPFLOW_BROKER_URL") {
            let url = url.trim().to_string();
            self.queue.broker_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(path) = lookup("CLIPFLOW_FFMPEG") {
            self.render.ffmpeg_path = path;
        }
        if let Some(root) = lookup("CLIPFLOW_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(level) = lookup("CLIPFLOW_LOG") {
            self.logging.level = level;
        }
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("clipflow").join("config.json")
}

/// Default blob storage directory.
fn dirs_default_storage() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("clipflow").join("blobs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_worker_limits() {
        let config = AppConfig::default();
        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.queue.max_attempts, 2);
        assert_eq!(config.engine.max_concurrent_runs, 5);
        assert_eq!(config.engine.max_delay_secs, 300);
        assert!(config.queue.broker_url.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"queue":{"broker_url":"memory://"}}"#).unwrap();
        assert_eq!(config.queue.broker_url.as_deref(), Some("memory://"));
        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.render.draft_video_bitrate_kbps, 2500);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CLIPFLOW_BROKER_URL", "memory://"),
            ("CLIPFLOW_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.queue.broker_url.as_deref(), Some("memory://"));
        assert_eq!(config.render.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
    }

    #[test]
    fn test_empty_broker_override_selects_inline_mode() {
        let mut config = AppConfig::default();
        config.queue.broker_url = Some("memory://".into());
        config.apply_env_overrides(|key| (key == "CLIPFLOW_BROKER_URL").then(String::new));
        assert!(config.queue.broker_url.is_none());
    }
}
