//! Edit Decision List types.
//!
//! The EDL is the only artifact exchanged between the planning and rendering
//! halves. It is stored as a JSON blob (`camelCase` keys) and re-validated
//! every time it crosses a storage or network hop.

use serde::{Deserialize, Serialize};

/// Current EDL schema version.
pub const EDL_VERSION: u32 = 1;

/// Output frame rate used when the document omits one.
pub const DEFAULT_FPS: u32 = 30;

/// Voice level applied when neither a volume nor a gain is given.
pub const DEFAULT_VOICE_VOLUME: f64 = 1.0;

/// Music level applied when neither a volume nor a gain is given.
pub const DEFAULT_MUSIC_VOLUME: f64 = 0.25;

/// A complete edit: what to cut, what to say on screen, how it sounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edl {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Clips in output order.
    pub timeline: Vec<TimelineClip>,

    /// Burned-in text overlays.
    #[serde(default)]
    pub overlays: Vec<TextOverlay>,

    /// Voiceover and music mix.
    pub audio: AudioMix,

    /// Optional color adjustment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorGrade>,

    /// Encoded output format.
    pub output: OutputFormat,
}

/// One trimmed source clip placed on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineClip {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Where the source media lives (presigned URL or `blob://` key).
    pub source_url: String,

    /// In point on the source axis.
    pub in_sec: f64,

    /// Out point on the source axis.
    pub out_sec: f64,

    /// Position on the output timeline.
    pub start_sec: f64,
}

/// A text overlay shown between two output-timeline instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub text: String,

    pub start_sec: f64,

    pub end_sec: f64,

    #[serde(default)]
    pub position: OverlayPosition,

    /// Named caption style (`bold_white`, `yellow`, `minimal_lower_third`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<String>,
}

/// Vertical anchor of a text overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

/// Audio mix settings.
///
/// Linear volumes take precedence over dB gains when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMix {
    /// Voiceover source. An empty string means "no voiceover track".
    pub voiceover_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_volume: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_volume: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_gain_db: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_gain_db: Option<f64>,
}

/// Color adjustment multipliers. 1.0 leaves the channel untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorGrade {
    #[serde(default = "unit")]
    pub saturation: f64,

    #[serde(default = "unit")]
    pub contrast: f64,

    #[serde(default = "unit")]
    pub vibrance: f64,
}

/// Encoded output dimensions and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_version() -> u32 {
    EDL_VERSION
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn unit() -> f64 {
    1.0
}

impl Edl {
    /// Total output duration: the sum of all clip durations.
    pub fn duration_sec(&self) -> f64 {
        self.timeline.iter().map(TimelineClip::duration_sec).sum()
    }

    /// Clips sorted by their timeline position (stable for equal starts).
    pub fn clips_in_timeline_order(&self) -> Vec<&TimelineClip> {
        let mut clips: Vec<&TimelineClip> = self.timeline.iter().collect();
        clips.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
        clips
    }

    /// Every distinct source URL, in order of first appearance.
    pub fn distinct_source_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::new();
        for clip in &self.timeline {
            if !urls.contains(&clip.source_url.as_str()) {
                urls.push(&clip.source_url);
            }
        }
        urls
    }

    /// Color grade with defaults applied.
    pub fn color_grade(&self) -> ColorGrade {
        self.color.unwrap_or_default()
    }

    /// Serialize as pretty JSON (the blob format).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl TimelineClip {
    /// Length of the trimmed segment.
    pub fn duration_sec(&self) -> f64 {
        self.out_sec - self.in_sec
    }

    /// Where this clip ends on the output timeline.
    pub fn end_sec(&self) -> f64 {
        self.start_sec + self.duration_sec()
    }
}

impl Default for ColorGrade {
    fn default() -> Self {
        Self {
            saturation: 1.0,
            contrast: 1.0,
            vibrance: 1.0,
        }
    }
}

impl ColorGrade {
    /// True when applying this grade would change nothing.
    pub fn is_identity(&self) -> bool {
        (self.saturation - 1.0).abs() < 1e-6
            && (self.contrast - 1.0).abs() < 1e-6
            && (self.vibrance - 1.0).abs() < 1e-6
    }
}

impl AudioMix {
    /// A mix with only a voiceover and all levels left to defaults.
    pub fn voiceover(url: impl Into<String>) -> Self {
        Self {
            voiceover_url: url.into(),
            music_url: None,
            voice_volume: None,
            music_volume: None,
            music_enabled: None,
            voice_gain_db: None,
            music_gain_db: None,
        }
    }

    pub fn has_voiceover(&self) -> bool {
        !self.voiceover_url.trim().is_empty()
    }

    /// Music plays when a URL is set and it has not been switched off.
    pub fn music_active(&self) -> bool {
        self.music_enabled != Some(false)
            && self
                .music_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
    }

    /// Effective linear voice level in `[0, 1]`.
    pub fn voice_level(&self) -> f64 {
        resolve_level(self.voice_volume, self.voice_gain_db, DEFAULT_VOICE_VOLUME)
    }

    /// Effective linear music level in `[0, 1]`.
    pub fn music_level(&self) -> f64 {
        resolve_level(self.music_volume, self.music_gain_db, DEFAULT_MUSIC_VOLUME)
    }
}

/// Convert a gain in decibels to a linear amplitude factor.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

fn resolve_level(volume: Option<f64>, gain_db: Option<f64>, default: f64) -> f64 {
    volume
        .or_else(|| gain_db.map(db_to_linear))
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(url: &str, in_sec: f64, out_sec: f64, start_sec: f64) -> TimelineClip {
        TimelineClip {
            id: None,
            source_url: url.to_string(),
            in_sec,
            out_sec,
            start_sec,
        }
    }

    #[test]
    fn test_volume_beats_gain() {
        let mut mix = AudioMix::voiceover("blob://voice.mp3");
        mix.voice_volume = Some(0.5);
        mix.voice_gain_db = Some(-6.0);
        assert!((mix.voice_level() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_gain_used_when_volume_absent() {
        let mut mix = AudioMix::voiceover("blob://voice.mp3");
        mix.music_gain_db = Some(-20.0);
        assert!((mix.music_level() - 0.1).abs() < 1e-9);
        assert!((mix.voice_level() - DEFAULT_VOICE_VOLUME).abs() < 1e-9);
    }

    #[test]
    fn test_music_active_requires_url_and_enabled() {
        let mut mix = AudioMix::voiceover("");
        assert!(!mix.music_active());
        mix.music_url = Some("blob://music.mp3".into());
        assert!(mix.music_active());
        mix.music_enabled = Some(false);
        assert!(!mix.music_active());
        assert!(!mix.has_voiceover());
    }

    #[test]
    fn test_timeline_helpers() {
        let edl = Edl {
            version: EDL_VERSION,
            timeline: vec![
                clip("b", 0.0, 2.0, 3.0),
                clip("a", 1.0, 4.0, 0.0),
                clip("a", 0.0, 1.0, 5.0),
            ],
            overlays: vec![],
            audio: AudioMix::voiceover(""),
            color: None,
            output: OutputFormat {
                width: 1080,
                height: 1920,
                fps: 30,
            },
        };

        assert!((edl.duration_sec() - 6.0).abs() < 1e-9);
        assert_eq!(edl.distinct_source_urls(), vec!["b", "a"]);
        let ordered: Vec<f64> = edl
            .clips_in_timeline_order()
            .iter()
            .map(|c| c.start_sec)
            .collect();
        assert_eq!(ordered, vec![0.0, 3.0, 5.0]);
        assert!(edl.color_grade().is_identity());
    }
}
