//! EDL assembly around a planned timeline.

use std::fmt;
use std::str::FromStr;

use clipflow_edl::{
    AudioMix, Edl, EdlError, OutputFormat, OverlayPosition, TextOverlay, DEFAULT_FPS, EDL_VERSION,
};
use serde::{Deserialize, Serialize};

use crate::planner::{plan_timeline, SourceClip};

/// Hook text stays on screen for at most this long.
pub const HOOK_DURATION_SECS: f64 = 1.5;

const HOOK_STYLE: &str = "bold_white";
const DEFAULT_MUSIC_GAIN_DB: f64 = -18.0;

/// Output aspect ratios the builder knows resolutions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    /// Output resolution as `(width, height)`.
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Vertical => (1080, 1920),
            Self::Square => (1080, 1080),
            Self::Landscape => (1920, 1080),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertical => "9:16",
            Self::Square => "1:1",
            Self::Landscape => "16:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "9:16" => Ok(Self::Vertical),
            "1:1" => Ok(Self::Square),
            "16:9" => Ok(Self::Landscape),
            other => Err(BuildError::UnknownAspectRatio(other.to_string())),
        }
    }
}

/// Errors from [`build_edl`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("unknown aspect ratio '{0}' (expected 9:16, 1:1 or 16:9)")]
    UnknownAspectRatio(String),

    #[error("nothing to plan: no clips or non-positive target duration")]
    EmptyTimeline,

    #[error(transparent)]
    Invalid(#[from] EdlError),
}

/// Inputs for [`build_edl`].
#[derive(Debug, Clone)]
pub struct EdlBuildOptions {
    pub clips: Vec<SourceClip>,
    pub target_duration_sec: f64,
    pub min_clip_sec: f64,
    pub max_clip_sec: f64,
    pub seed: Option<u64>,
    pub aspect_ratio: AspectRatio,
    pub hook_text: Option<String>,
    pub voiceover_url: Option<String>,
    pub music_url: Option<String>,
    pub fps: Option<u32>,
}

impl EdlBuildOptions {
    /// Options with the usual short-form defaults (1.5–3.5 s segments, 9:16).
    pub fn new(clips: Vec<SourceClip>, target_duration_sec: f64) -> Self {
        Self {
            clips,
            target_duration_sec,
            min_clip_sec: 1.5,
            max_clip_sec: 3.5,
            seed: None,
            aspect_ratio: AspectRatio::default(),
            hook_text: None,
            voiceover_url: None,
            music_url: None,
            fps: None,
        }
    }
}

/// Plan a timeline and wrap it into a validated EDL.
pub fn build_edl(options: EdlBuildOptions) -> Result<Edl, BuildError> {
    let timeline = plan_timeline(
        &options.clips,
        options.target_duration_sec,
        options.min_clip_sec,
        options.max_clip_sec,
        options.seed,
    );
    if timeline.is_empty() {
        return Err(BuildError::EmptyTimeline);
    }

    let total: f64 = timeline.iter().map(|c| c.duration_sec()).sum();

    let overlays = options
        .hook_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| TextOverlay {
            id: Some("hook".to_string()),
            text: text.to_string(),
            start_sec: 0.0,
            end_sec: HOOK_DURATION_SECS.min(total),
            position: OverlayPosition::Bottom,
            style_preset: Some(HOOK_STYLE.to_string()),
        })
        .into_iter()
        .collect();

    let music_url = options.music_url.filter(|url| !url.trim().is_empty());
    let audio = AudioMix {
        voiceover_url: options.voiceover_url.unwrap_or_default(),
        music_enabled: Some(music_url.is_some()),
        music_url,
        voice_volume: None,
        music_volume: None,
        voice_gain_db: Some(0.0),
        music_gain_db: Some(DEFAULT_MUSIC_GAIN_DB),
    };

    let (width, height) = options.aspect_ratio.resolution();
    let edl = Edl {
        version: EDL_VERSION,
        timeline,
        overlays,
        audio,
        color: None,
        output: OutputFormat {
            width,
            height,
            fps: options.fps.unwrap_or(DEFAULT_FPS),
        },
    };

    edl.check()?;
    Ok(edl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clips() -> Vec<SourceClip> {
        vec![
            SourceClip::new("blob://a.mp4", Some(10.0)),
            SourceClip::new("blob://b.mp4", Some(5.0)),
        ]
    }

    #[test]
    fn test_aspect_ratio_resolutions() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap().resolution(), (1080, 1920));
        assert_eq!("1:1".parse::<AspectRatio>().unwrap().resolution(), (1080, 1080));
        assert_eq!("16:9".parse::<AspectRatio>().unwrap().resolution(), (1920, 1080));
        assert!(matches!(
            "4:3".parse::<AspectRatio>(),
            Err(BuildError::UnknownAspectRatio(_))
        ));
    }

    #[test]
    fn test_hook_overlay_and_audio_defaults() {
        let mut options = EdlBuildOptions::new(clips(), 8.0);
        options.hook_text = Some("Wait for it".into());
        options.voiceover_url = Some("blob://voice.mp3".into());
        options.seed = Some(11);

        let edl = build_edl(options).unwrap();
        let hook = &edl.overlays[0];
        assert_eq!(hook.id.as_deref(), Some("hook"));
        assert_eq!(hook.start_sec, 0.0);
        assert!((hook.end_sec - HOOK_DURATION_SECS).abs() < 1e-9);
        assert_eq!(hook.position, OverlayPosition::Bottom);

        assert_eq!(edl.audio.voice_gain_db, Some(0.0));
        assert_eq!(edl.audio.music_gain_db, Some(-18.0));
        assert_eq!(edl.audio.music_enabled, Some(false));
        assert_eq!(edl.output.fps, DEFAULT_FPS);
        assert_eq!((edl.output.width, edl.output.height), (1080, 1920));
    }

    #[test]
    fn test_hook_clamped_to_short_timeline() {
        let mut options = EdlBuildOptions::new(clips(), 1.0);
        options.min_clip_sec = 0.5;
        options.hook_text = Some("Quick".into());
        let edl = build_edl(options).unwrap();
        assert!((edl.overlays[0].end_sec - edl.duration_sec()).abs() < 1e-9);
    }

    #[test]
    fn test_music_enables_mix() {
        let mut options = EdlBuildOptions::new(clips(), 6.0);
        options.music_url = Some("blob://music.mp3".into());
        let edl = build_edl(options).unwrap();
        assert_eq!(edl.audio.music_enabled, Some(true));
        assert!(edl.audio.music_active());
    }

    #[test]
    fn test_empty_plan_is_an_error() {
        let options = EdlBuildOptions::new(vec![], 6.0);
        assert!(matches!(build_edl(options), Err(BuildError::EmptyTimeline)));
    }
}
