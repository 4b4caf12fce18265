//! EDL validation.
//!
//! Validation runs in two passes: serde enforces shape and fills defaults
//! (`overlays = []`, `output.fps = 30`, `position = bottom`), then
//! [`Edl::issues`] checks every numeric bound and timeline invariant and
//! reports all violations at once.

use std::fmt;

use serde_json::Value;

use crate::edl::{Edl, EDL_VERSION};

/// Tolerance when checking that clip start times are contiguous.
pub const CONTIGUITY_TOLERANCE_SECS: f64 = 1e-3;

/// Errors produced while reading or validating an EDL.
#[derive(Debug, thiserror::Error)]
pub enum EdlError {
    #[error("EDL is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("EDL does not match the schema: {0}")]
    Schema(#[source] serde_json::Error),

    #[error("EDL failed validation: {}", join_issues(.issues))]
    Invalid { issues: Vec<EdlIssue> },
}

/// One violated rule, located by a JSON-path-like string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdlIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for EdlIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_issues(issues: &[EdlIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate a raw JSON document and return the normalized EDL.
pub fn validate(raw: &Value) -> Result<Edl, EdlError> {
    let edl: Edl = serde_json::from_value(raw.clone()).map_err(EdlError::Schema)?;
    edl.check()?;
    Ok(edl)
}

/// Parse and validate an EDL from its JSON text.
pub fn parse_edl(json: &str) -> Result<Edl, EdlError> {
    let raw: Value = serde_json::from_str(json).map_err(EdlError::Parse)?;
    validate(&raw)
}

/// Parse and validate an EDL from raw bytes (as read back from storage).
pub fn parse_edl_bytes(bytes: &[u8]) -> Result<Edl, EdlError> {
    let raw: Value = serde_json::from_slice(bytes).map_err(EdlError::Parse)?;
    validate(&raw)
}

impl Edl {
    /// Parse and validate JSON text. Same as [`parse_edl`].
    pub fn parse(json: &str) -> Result<Self, EdlError> {
        parse_edl(json)
    }

    /// Re-check an in-memory EDL before it crosses a hop.
    pub fn check(&self) -> Result<(), EdlError> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(EdlError::Invalid { issues })
        }
    }

    /// Every rule this EDL violates. Empty means valid.
    pub fn issues(&self) -> Vec<EdlIssue> {
        let mut issues = Issues::default();

        if self.version != EDL_VERSION {
            issues.push(
                "version",
                format!("unsupported version {} (expected {EDL_VERSION})", self.version),
            );
        }

        if self.timeline.is_empty() {
            issues.push("timeline", "must contain at least one clip");
        }

        let mut cumulative = 0.0;
        for (i, clip) in self.timeline.iter().enumerate() {
            let at = |field: &str| format!("timeline[{i}].{field}");

            if clip.source_url.trim().is_empty() {
                issues.push(at("sourceUrl"), "must not be empty");
            }
            if !clip.in_sec.is_finite() || clip.in_sec < 0.0 {
                issues.push(at("inSec"), "must be a finite number >= 0");
            }
            if !clip.out_sec.is_finite() || clip.out_sec <= clip.in_sec {
                issues.push(at("outSec"), "must be greater than inSec");
            }
            if !clip.start_sec.is_finite()
                || (clip.start_sec - cumulative).abs() > CONTIGUITY_TOLERANCE_SECS
            {
                issues.push(
                    at("startSec"),
                    format!("must equal the cumulative duration of earlier clips ({cumulative:.3})"),
                );
            }
            let duration = clip.duration_sec();
            if duration.is_finite() && duration > 0.0 {
                cumulative += duration;
            }
        }

        for (i, overlay) in self.overlays.iter().enumerate() {
            let at = |field: &str| format!("overlays[{i}].{field}");

            if overlay.text.trim().is_empty() {
                issues.push(at("text"), "must not be empty");
            }
            if !overlay.start_sec.is_finite() || overlay.start_sec < 0.0 {
                issues.push(at("startSec"), "must be a finite number >= 0");
            }
            if !overlay.end_sec.is_finite() || overlay.end_sec <= overlay.start_sec {
                issues.push(at("endSec"), "must be greater than startSec");
            }
        }

        let audio = &self.audio;
        for (field, value) in [
            ("voiceVolume", audio.voice_volume),
            ("musicVolume", audio.music_volume),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    issues.push(format!("audio.{field}"), "must be within [0, 1]");
                }
            }
        }
        for (field, value) in [
            ("voiceGainDb", audio.voice_gain_db),
            ("musicGainDb", audio.music_gain_db),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                issues.push(format!("audio.{field}"), "must be a finite number");
            }
        }

        if let Some(color) = &self.color {
            for (field, value) in [
                ("saturation", color.saturation),
                ("contrast", color.contrast),
                ("vibrance", color.vibrance),
            ] {
                if !value.is_finite() || value < 0.0 {
                    issues.push(format!("color.{field}"), "must be a finite number >= 0");
                }
            }
        }

        if self.output.width == 0 {
            issues.push("output.width", "must be greater than 0");
        }
        if self.output.height == 0 {
            issues.push("output.height", "must be greater than 0");
        }
        if self.output.fps == 0 {
            issues.push("output.fps", "must be greater than 0");
        }

        issues.0
    }
}

#[derive(Default)]
struct Issues(Vec<EdlIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(EdlIssue {
            path: path.into(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edl::{OverlayPosition, DEFAULT_FPS};
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "timeline": [
                { "sourceUrl": "blob://clips/a.mp4", "inSec": 0.0, "outSec": 2.0, "startSec": 0.0 },
                { "sourceUrl": "blob://clips/b.mp4", "inSec": 1.0, "outSec": 2.5, "startSec": 2.0 }
            ],
            "audio": { "voiceoverUrl": "blob://voice.mp3" },
            "output": { "width": 1080, "height": 1920 }
        })
    }

    #[test]
    fn test_missing_optionals_get_defaults() {
        let edl = validate(&minimal()).unwrap();
        assert!(edl.overlays.is_empty());
        assert_eq!(edl.output.fps, DEFAULT_FPS);
        assert_eq!(edl.version, EDL_VERSION);
        assert!(edl.color.is_none());
    }

    #[test]
    fn test_overlay_position_defaults_to_bottom() {
        let mut raw = minimal();
        raw["overlays"] = json!([{ "text": "Hook", "startSec": 0.0, "endSec": 1.5 }]);
        let edl = validate(&raw).unwrap();
        assert_eq!(edl.overlays[0].position, OverlayPosition::Bottom);
    }

    #[test]
    fn test_color_fields_default_to_one() {
        let mut raw = minimal();
        raw["color"] = json!({ "saturation": 1.2 });
        let edl = validate(&raw).unwrap();
        let color = edl.color.unwrap();
        assert!((color.saturation - 1.2).abs() < 1e-9);
        assert!((color.contrast - 1.0).abs() < 1e-9);
        assert!((color.vibrance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_required_field_is_schema_error() {
        let mut raw = minimal();
        raw.as_object_mut().unwrap().remove("audio");
        assert!(matches!(validate(&raw), Err(EdlError::Schema(_))));
    }

    #[test]
    fn test_collects_every_violation() {
        let raw = json!({
            "timeline": [
                { "sourceUrl": "", "inSec": 2.0, "outSec": 1.0, "startSec": 0.5 }
            ],
            "overlays": [{ "text": " ", "startSec": 3.0, "endSec": 3.0 }],
            "audio": { "voiceoverUrl": "", "musicVolume": 1.5 },
            "output": { "width": 0, "height": 1920, "fps": 0 }
        });

        let Err(EdlError::Invalid { issues }) = validate(&raw) else {
            panic!("expected validation issues");
        };
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        for expected in [
            "timeline[0].sourceUrl",
            "timeline[0].outSec",
            "timeline[0].startSec",
            "overlays[0].text",
            "overlays[0].endSec",
            "audio.musicVolume",
            "output.width",
            "output.fps",
        ] {
            assert!(paths.contains(&expected), "missing issue for {expected}");
        }
    }

    #[test]
    fn test_gap_in_timeline_rejected() {
        let mut raw = minimal();
        raw["timeline"][1]["startSec"] = json!(2.5);
        let err = validate(&raw).unwrap_err();
        assert!(err.to_string().contains("timeline[1].startSec"));
    }

    #[test]
    fn test_empty_timeline_rejected() {
        let mut raw = minimal();
        raw["timeline"] = json!([]);
        assert!(matches!(validate(&raw), Err(EdlError::Invalid { .. })));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut raw = minimal();
        raw["version"] = json!(2);
        assert!(validate(&raw).unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_edl("{not json"), Err(EdlError::Parse(_))));
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let once = validate(&minimal()).unwrap();
        let json = once.to_json_pretty().unwrap();
        let twice = parse_edl(&json).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }
}
