//! Render orchestration.
//!
//! Stages run strictly in order, each as one encoder invocation (trim runs
//! once per clip). Every intermediate file lives in a per-call scratch
//! directory that is removed on every exit path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use clipflow_captions::build_caption_track;
use clipflow_common::{RenderConfig, Throttle};
use clipflow_edl::{Edl, EdlError};
use clipflow_services::{AssetFetcher, StorageError};
use tokio::task::JoinHandle;

use crate::encoder::{ComposeSpec, EncodeProgress, EncodeProgressFn, Encoder, EncoderCommand, EncoderFailure};
use crate::filters::{AudioPlan, VideoFilter};
use crate::progress::{percent_complete, PreviewCallback, RenderCallbacks, RenderProgress, RenderStage};

/// Smallest valid MP4: a lone `ftyp` box. Returned in place of a failed render.
const PLACEHOLDER_MP4: [u8; 24] = [
    0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', 0x00, 0x00, 0x02,
    0x00, b'i', b's', b'o', b'm', b'm', b'p', b'4', b'1',
];

/// Fixed placeholder video substituted by [`RenderPolicy::Degrade`].
pub fn placeholder_video() -> Bytes {
    Bytes::from_static(&PLACEHOLDER_MP4)
}

/// Output quality. Only the video bitrate differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderQuality {
    Draft,
    Final,
}

/// What a caller does when a render fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderPolicy {
    /// Log the failure and hand back [`placeholder_video`].
    #[default]
    Degrade,
    /// Return the failure.
    Propagate,
}

impl RenderPolicy {
    pub fn from_degrade_flag(degrade: bool) -> Self {
        if degrade {
            Self::Degrade
        } else {
            Self::Propagate
        }
    }
}

/// Result of [`RenderOrchestrator::render_with_policy`].
#[derive(Debug, Clone)]
pub struct RenderedVideo {
    pub bytes: Bytes,
    /// True when `bytes` is the placeholder.
    pub placeholder: bool,
}

/// Why a render failed.
#[derive(Debug, thiserror::Error)]
pub enum RenderFailure {
    #[error("EDL rejected before render: {0}")]
    InvalidEdl(#[from] EdlError),

    #[error("failed to prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: StorageError,
    },

    #[error("{stage:?} stage failed: {source}")]
    Encoder {
        stage: RenderStage,
        #[source]
        source: EncoderFailure,
    },

    #[error("render I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoder produced an empty output")]
    EmptyOutput,
}

/// Encoder-facing render settings.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub draft_video_bitrate_kbps: u32,
    pub final_video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    /// Floor for trimmed segment length, avoiding zero-frame segments.
    pub min_segment_secs: f64,
    /// Minimum wall-clock spacing between preview frames.
    pub preview_interval: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for RenderSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            draft_video_bitrate_kbps: config.draft_video_bitrate_kbps,
            final_video_bitrate_kbps: config.final_video_bitrate_kbps,
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            min_segment_secs: config.min_segment_secs,
            preview_interval: Duration::from_millis(config.preview_interval_ms),
        }
    }
}

impl RenderSettings {
    fn video_bitrate(&self, quality: RenderQuality) -> u32 {
        match quality {
            RenderQuality::Draft => self.draft_video_bitrate_kbps,
            RenderQuality::Final => self.final_video_bitrate_kbps,
        }
    }
}

/// Drives the encoder through the render stages.
pub struct RenderOrchestrator {
    encoder: Arc<dyn Encoder>,
    fetcher: Arc<dyn AssetFetcher>,
    settings: RenderSettings,
}

impl RenderOrchestrator {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        fetcher: Arc<dyn AssetFetcher>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            encoder,
            fetcher,
            settings,
        }
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Render `edl` to encoded video bytes.
    ///
    /// `voiceover`, when given, replaces the EDL's voiceover URL.
    #[tracing::instrument(skip_all, fields(clips = edl.timeline.len(), quality = ?quality))]
    pub async fn render(
        &self,
        edl: &Edl,
        voiceover: Option<Bytes>,
        quality: RenderQuality,
        callbacks: RenderCallbacks,
    ) -> Result<Bytes, RenderFailure> {
        edl.check()?;
        callbacks.report(RenderStage::Preparing, 0.0);

        let scratch = tempfile::Builder::new()
            .prefix("clipflow-render-")
            .tempdir()
            .map_err(RenderFailure::Scratch)?;

        let started = Instant::now();
        let result = self
            .run_stages(edl, voiceover, quality, &callbacks, scratch.path())
            .await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(
                path = %scratch_path.display(),
                error = %e,
                "Failed to remove render scratch directory"
            );
        }

        match &result {
            Ok(bytes) => tracing::info!(
                size_bytes = bytes.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Render finished"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                duration_ms = started.elapsed().as_millis() as u64,
                "Render failed"
            ),
        }
        result
    }

    /// Render and apply `policy` to failures.
    pub async fn render_with_policy(
        &self,
        edl: &Edl,
        voiceover: Option<Bytes>,
        quality: RenderQuality,
        callbacks: RenderCallbacks,
        policy: RenderPolicy,
    ) -> Result<RenderedVideo, RenderFailure> {
        match self.render(edl, voiceover, quality, callbacks).await {
            Ok(bytes) => Ok(RenderedVideo {
                bytes,
                placeholder: false,
            }),
            Err(failure) => match policy {
                RenderPolicy::Degrade => {
                    tracing::warn!(error = %failure, "Substituting placeholder video for failed render");
                    Ok(RenderedVideo {
                        bytes: placeholder_video(),
                        placeholder: true,
                    })
                }
                RenderPolicy::Propagate => Err(failure),
            },
        }
    }

    async fn run_stages(
        &self,
        edl: &Edl,
        voiceover: Option<Bytes>,
        quality: RenderQuality,
        callbacks: &RenderCallbacks,
        scratch: &Path,
    ) -> Result<Bytes, RenderFailure> {
        callbacks.report(RenderStage::Fetching, 0.0);
        let sources = self.fetch_sources(edl, scratch).await?;

        callbacks.report(RenderStage::Trimming, 0.0);
        // Trimmed in timeline order, not array order, so the concat list follows `startSec`.
        let mut segments: Vec<PathBuf> = Vec::with_capacity(edl.timeline.len());
        for (i, clip) in edl.clips_in_timeline_order().into_iter().enumerate() {
            let input = sources.get(clip.source_url.as_str()).ok_or_else(|| {
                RenderFailure::Fetch {
                    url: clip.source_url.clone(),
                    source: StorageError::NotFound(clip.source_url.clone()),
                }
            })?;
            let output = scratch.join(format!("seg-{i:04}.mp4"));
            let command = EncoderCommand::Trim {
                input: input.clone(),
                output: output.clone(),
                start_sec: clip.in_sec,
                duration_sec: clip.duration_sec().max(self.settings.min_segment_secs),
            };
            self.run_stage(RenderStage::Trimming, &command, None).await?;
            segments.push(output);
        }

        callbacks.report(RenderStage::Concatenating, 0.0);
        let list_file = scratch.join("concat.txt");
        tokio::fs::write(&list_file, concat_list(segments.iter().map(PathBuf::as_path)))
            .await?;
        let concat = scratch.join("concat.mp4");
        let command = EncoderCommand::Concat {
            list_file,
            output: concat.clone(),
        };
        self.run_stage(RenderStage::Concatenating, &command, None)
            .await?;

        let caption_track = build_caption_track(edl);
        let captions = if caption_track.is_empty() {
            None
        } else {
            let path = scratch.join("captions.ass");
            tokio::fs::write(&path, caption_track).await?;
            Some(path)
        };
        let video_filter =
            VideoFilter::new(&edl.output, edl.color_grade(), captions.as_deref()).to_filter_string();

        let voice = match voiceover.filter(|bytes| !bytes.is_empty()) {
            Some(bytes) => {
                let path = scratch.join("voice.audio");
                tokio::fs::write(&path, &bytes).await?;
                Some(path)
            }
            None if edl.audio.has_voiceover() => Some(
                self.fetch_to(&edl.audio.voiceover_url, scratch.join("voice.audio"))
                    .await?,
            ),
            None => None,
        };
        let music = match edl.audio.music_url.as_deref() {
            Some(url) if edl.audio.music_active() => {
                Some(self.fetch_to(url, scratch.join("music.audio")).await?)
            }
            _ => None,
        };
        let audio = AudioPlan::from_mix(&edl.audio, voice.is_some(), music.is_some());

        let total = edl.duration_sec();
        let output = scratch.join("output.mp4");
        let spec = ComposeSpec {
            video: concat.clone(),
            voice,
            music,
            video_filter,
            audio,
            fps: edl.output.fps,
            video_bitrate_kbps: self.settings.video_bitrate(quality),
            audio_bitrate_kbps: self.settings.audio_bitrate_kbps,
            duration_sec: total,
            output: output.clone(),
        };

        tracing::debug!(
            duration_secs = total,
            audio = ?audio,
            captions = captions.is_some(),
            "Composing output"
        );

        callbacks.report(RenderStage::Encoding, 0.0);
        let previews = match (&callbacks.on_progress, &callbacks.on_preview) {
            (Some(_), Some(preview)) => PreviewPump::start(
                self.encoder.clone(),
                concat,
                scratch.to_path_buf(),
                edl.output.width,
                total,
                preview.clone(),
                self.settings.preview_interval,
            ),
            _ => None,
        };
        let progress = compose_progress(callbacks, total, previews.clone());

        let composed = self
            .run_stage(RenderStage::Encoding, &EncoderCommand::Compose(spec), progress)
            .await;
        if let Some(previews) = &previews {
            previews.finish().await;
        }
        composed?;

        let bytes = tokio::fs::read(&output).await?;
        if bytes.is_empty() {
            return Err(RenderFailure::EmptyOutput);
        }
        callbacks.report(RenderStage::Complete, 1.0);
        Ok(Bytes::from(bytes))
    }

    async fn run_stage(
        &self,
        stage: RenderStage,
        command: &EncoderCommand,
        progress: Option<EncodeProgressFn>,
    ) -> Result<(), RenderFailure> {
        self.encoder
            .run(command, progress)
            .await
            .map_err(|source| RenderFailure::Encoder { stage, source })
    }

    /// Fetch each distinct timeline source once.
    async fn fetch_sources(
        &self,
        edl: &Edl,
        scratch: &Path,
    ) -> Result<HashMap<String, PathBuf>, RenderFailure> {
        let mut sources = HashMap::new();
        for (i, url) in edl.distinct_source_urls().into_iter().enumerate() {
            let path = scratch.join(format!("src-{i:03}.{}", media_extension(url)));
            let path = self.fetch_to(url, path).await?;
            sources.insert(url.to_string(), path);
        }
        tracing::debug!(sources = sources.len(), "Fetched timeline sources");
        Ok(sources)
    }

    async fn fetch_to(&self, url: &str, path: PathBuf) -> Result<PathBuf, RenderFailure> {
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| RenderFailure::Fetch {
                url: url.to_string(),
                source,
            })?;
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

fn compose_progress(
    callbacks: &RenderCallbacks,
    total_secs: f64,
    previews: Option<Arc<PreviewPump>>,
) -> Option<EncodeProgressFn> {
    let on_progress = callbacks.on_progress.clone()?;
    Some(Arc::new(move |sample: EncodeProgress| {
        let percent = if sample.complete {
            1.0
        } else {
            percent_complete(sample.out_time_secs, total_secs)
        };
        on_progress(RenderProgress::new(RenderStage::Encoding, percent));
        if let Some(previews) = &previews {
            if !sample.complete {
                previews.offer(sample.out_time_secs);
            }
        }
    }))
}

/// Concat demuxer list. Single quotes in paths are closed, escaped and reopened.
fn concat_list<'a>(paths: impl Iterator<Item = &'a Path>) -> String {
    paths
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', "'\\''")))
        .collect()
}

/// File extension for a fetched asset, taken from its URL when it looks sane.
fn media_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => "bin",
    }
}

/// Best-effort preview extraction, at most one frame in flight.
struct PreviewPump {
    encoder: Arc<dyn Encoder>,
    source: PathBuf,
    scratch: PathBuf,
    width: u32,
    total_secs: f64,
    callback: PreviewCallback,
    throttle: Mutex<Throttle>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    frames: AtomicU64,
    runtime: tokio::runtime::Handle,
}

impl PreviewPump {
    fn start(
        encoder: Arc<dyn Encoder>,
        source: PathBuf,
        scratch: PathBuf,
        width: u32,
        total_secs: f64,
        callback: PreviewCallback,
        interval: Duration,
    ) -> Option<Arc<Self>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        Some(Arc::new(Self {
            encoder,
            source,
            scratch,
            width: (width / 3).max(2),
            total_secs,
            callback,
            throttle: Mutex::new(Throttle::new(interval)),
            in_flight: Mutex::new(None),
            frames: AtomicU64::new(0),
            runtime,
        }))
    }

    fn offer(self: &Arc<Self>, at_sec: f64) {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return;
        };
        if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let ready = self
            .throttle
            .lock()
            .map(|mut throttle| throttle.should_tick())
            .unwrap_or(false);
        if !ready {
            return;
        }

        let frame = self.frames.fetch_add(1, Ordering::Relaxed);
        let at_sec = at_sec.clamp(0.0, (self.total_secs - 0.05).max(0.0));
        let pump = Arc::clone(self);
        *in_flight = Some(self.runtime.spawn(async move {
            pump.extract(frame, at_sec).await;
        }));
    }

    async fn extract(&self, frame: u64, at_sec: f64) {
        let output = self.scratch.join(format!("preview-{frame}.jpg"));
        let command = EncoderCommand::ExtractFrame {
            input: self.source.clone(),
            output: output.clone(),
            at_sec,
            width: self.width,
        };
        match self.encoder.run(&command, None).await {
            Ok(()) => match tokio::fs::read(&output).await {
                Ok(bytes) if !bytes.is_empty() => (self.callback)(Bytes::from(bytes)),
                Ok(_) => tracing::debug!(frame, "Preview frame was empty"),
                Err(e) => tracing::debug!(frame, error = %e, "Preview frame unreadable"),
            },
            Err(e) => tracing::debug!(frame, error = %e, "Preview frame extraction failed"),
        }
        let _ = tokio::fs::remove_file(&output).await;
    }

    /// Wait for the in-flight extraction so it never outlives the scratch dir.
    async fn finish(&self) {
        let handle = self.in_flight.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_ftyp_box() {
        let bytes = placeholder_video();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[4..8], b"ftyp");
        assert_eq!(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 24);
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let paths = [Path::new("/s/seg-0.mp4"), Path::new("/s/it's.mp4")];
        assert_eq!(
            concat_list(paths.into_iter()),
            "file '/s/seg-0.mp4'\nfile '/s/it'\\''s.mp4'\n"
        );
    }

    #[test]
    fn test_media_extension() {
        assert_eq!(media_extension("https://cdn.x/a/clip.MOV?sig=1"), "MOV");
        assert_eq!(media_extension("blob://user-assets/u/clip.mp4"), "mp4");
        assert_eq!(media_extension("blob://user-assets/u/noext"), "bin");
        assert_eq!(media_extension("https://cdn.x/.hidden"), "bin");
    }

    #[test]
    fn test_settings_from_config() {
        let settings = RenderSettings::default();
        assert_eq!(settings.video_bitrate(RenderQuality::Draft), 2500);
        assert_eq!(settings.video_bitrate(RenderQuality::Final), 8000);
        assert_eq!(settings.preview_interval, Duration::from_millis(800));
        assert_eq!(RenderPolicy::from_degrade_flag(false), RenderPolicy::Propagate);
    }
}
