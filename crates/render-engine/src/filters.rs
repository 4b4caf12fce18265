//! Filter graph construction for the compose stage.

use std::path::Path;

use clipflow_edl::{AudioMix, ColorGrade, OutputFormat};

/// Video filter chain applied to the concatenated timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFilter {
    pub width: u32,
    pub height: u32,
    pub color: ColorGrade,
    /// Caption track to burn in.
    pub captions: Option<String>,
}

impl VideoFilter {
    pub fn new(output: &OutputFormat, color: ColorGrade, captions: Option<&Path>) -> Self {
        Self {
            width: output.width,
            height: output.height,
            color,
            captions: captions.map(|p| p.display().to_string()),
        }
    }

    /// Render as an ffmpeg filter chain (comma separated).
    pub fn to_filter_string(&self) -> String {
        let (w, h) = (self.width, self.height);
        let mut chain = vec![
            format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
            format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"),
            "setsar=1".to_string(),
        ];

        let color = self.color;
        let eq_part = ColorGrade {
            vibrance: 1.0,
            ..color
        };
        if !eq_part.is_identity() {
            chain.push(format!(
                "eq=saturation={:.3}:contrast={:.3}",
                color.saturation, color.contrast
            ));
        }
        let vibrance_part = ColorGrade {
            saturation: 1.0,
            contrast: 1.0,
            ..color
        };
        if !vibrance_part.is_identity() {
            chain.push(format!("vibrance=intensity={:.3}", color.vibrance - 1.0));
        }

        if let Some(path) = &self.captions {
            chain.push(format!("ass=filename='{}'", escape_filter_path(path)));
        }

        chain.join(",")
    }
}

/// Escape a path for use inside a quoted filter argument.
fn escape_filter_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\\\\\"),
            '\'' => out.push_str("'\\\\\\''"),
            ':' => out.push_str("\\\\:"),
            other => out.push(other),
        }
    }
    out
}

/// Which audio streams end up in the output, and how loud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioPlan {
    /// Video only.
    Silent,
    Voice { volume: f64 },
    Music { volume: f64 },
    /// Voice and music mixed; the mix ends with the shorter stream.
    Mixed { voice_volume: f64, music_volume: f64 },
}

impl AudioPlan {
    /// Choose a plan from the EDL mix and the tracks actually available.
    pub fn from_mix(mix: &AudioMix, has_voice: bool, has_music: bool) -> Self {
        match (has_voice, has_music) {
            (true, true) => Self::Mixed {
                voice_volume: mix.voice_level(),
                music_volume: mix.music_level(),
            },
            (true, false) => Self::Voice {
                volume: mix.voice_level(),
            },
            (false, true) => Self::Music {
                volume: mix.music_level(),
            },
            (false, false) => Self::Silent,
        }
    }

    pub fn has_audio(&self) -> bool {
        !matches!(self, Self::Silent)
    }

    /// Audio part of `-filter_complex`, labelled `[aout]`.
    ///
    /// Input 0 is always the video; voice (when present) is input 1 and music
    /// follows it.
    pub fn filter_graph(&self) -> Option<String> {
        match *self {
            Self::Silent => None,
            Self::Voice { volume } => Some(format!("[1:a]volume={volume:.3}[aout]")),
            Self::Music { volume } => Some(format!("[1:a]volume={volume:.3}[aout]")),
            Self::Mixed {
                voice_volume,
                music_volume,
            } => Some(format!(
                "[1:a]volume={voice_volume:.3}[voice];[2:a]volume={music_volume:.3}[music];\
                 [voice][music]amix=inputs=2:duration=shortest:dropout_transition=0:normalize=0[aout]"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> OutputFormat {
        OutputFormat {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }

    #[test]
    fn test_neutral_grade_emits_only_fit() {
        let filter = VideoFilter::new(&output(), ColorGrade::default(), None);
        assert_eq!(
            filter.to_filter_string(),
            "scale=1080:1920:force_original_aspect_ratio=decrease,\
             pad=1080:1920:(ow-iw)/2:(oh-ih)/2,setsar=1"
        );
    }

    #[test]
    fn test_color_and_captions() {
        let grade = ColorGrade {
            saturation: 1.2,
            contrast: 1.0,
            vibrance: 1.5,
        };
        let filter = VideoFilter::new(&output(), grade, Some(Path::new("/tmp/r/captions.ass")));
        let chain = filter.to_filter_string();
        assert!(chain.contains(",eq=saturation=1.200:contrast=1.000"));
        assert!(chain.contains(",vibrance=intensity=0.500"));
        assert!(chain.ends_with(",ass=filename='/tmp/r/captions.ass'"));
    }

    #[test]
    fn test_vibrance_only() {
        let grade = ColorGrade {
            vibrance: 0.8,
            ..ColorGrade::default()
        };
        let chain = VideoFilter::new(&output(), grade, None).to_filter_string();
        assert!(!chain.contains("eq="));
        assert!(chain.contains("vibrance=intensity=-0.200"));
    }

    #[test]
    fn test_filter_path_escaping() {
        assert_eq!(escape_filter_path("C:/x"), "C\\\\:/x");
    }

    #[test]
    fn test_audio_plans() {
        let mut mix = AudioMix::voiceover("blob://v.mp3");
        mix.music_url = Some("blob://m.mp3".into());
        mix.voice_volume = Some(0.9);
        mix.music_gain_db = Some(-20.0);

        let plan = AudioPlan::from_mix(&mix, true, true);
        let graph = plan.filter_graph().unwrap();
        assert!(graph.contains("[1:a]volume=0.900[voice]"));
        assert!(graph.contains("[2:a]volume=0.100[music]"));
        assert!(graph.contains("amix=inputs=2:duration=shortest"));

        assert_eq!(
            AudioPlan::from_mix(&mix, false, true).filter_graph().as_deref(),
            Some("[1:a]volume=0.100[aout]")
        );
        assert_eq!(AudioPlan::from_mix(&mix, false, false), AudioPlan::Silent);
        assert!(AudioPlan::Silent.filter_graph().is_none());
    }
}
