//! Timeline planning.
//!
//! Clips are visited round-robin (after an optional seeded shuffle) and each
//! visit contributes one segment starting at the clip's first frame. Planning
//! stops once the cumulative length reaches the target.

use clipflow_edl::TimelineClip;
use serde::{Deserialize, Serialize};

use crate::rng::Lcg;

/// Upper bound on produced segments, guarding degenerate inputs.
pub const MAX_SEGMENTS: usize = 10_000;

const TARGET_EPSILON: f64 = 1e-9;

/// A raw input clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceClip {
    pub url: String,

    /// Source length when known.
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
}

impl SourceClip {
    pub fn new(url: impl Into<String>, duration_sec: Option<f64>) -> Self {
        Self {
            url: url.into(),
            duration_sec,
        }
    }
}

/// One planned segment, before it is placed in an EDL.
pub type PlannedSegment = TimelineClip;

/// Plan a contiguous timeline that covers `target_duration_sec`.
///
/// Deterministic for a given `seed`. Without a seed the clip order is kept.
/// Returns an empty timeline for an empty clip list or a non-positive target.
pub fn plan_timeline(
    clips: &[SourceClip],
    target_duration_sec: f64,
    min_clip_sec: f64,
    max_clip_sec: f64,
    seed: Option<u64>,
) -> Vec<PlannedSegment> {
    if clips.is_empty() || !(target_duration_sec > 0.0) {
        return Vec::new();
    }

    let max_clip = max_clip_sec;
    let min_clip = min_clip_sec.min(max_clip_sec);

    let mut order: Vec<&SourceClip> = clips.iter().collect();
    if let Some(seed) = seed {
        Lcg::new(seed).shuffle(&mut order);
    }

    let mut timeline = Vec::new();
    let mut cumulative = 0.0;

    while cumulative < target_duration_sec - TARGET_EPSILON {
        if timeline.len() >= MAX_SEGMENTS {
            tracing::warn!(
                segments = timeline.len(),
                cumulative,
                target = target_duration_sec,
                "Segment cap reached before target"
            );
            break;
        }

        let clip = order[timeline.len() % order.len()];
        let known = clip
            .duration_sec
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(max_clip);
        let remaining = target_duration_sec - cumulative;
        let take = max_clip.min(min_clip.max(known)).min(remaining.max(min_clip));

        if !(take > 0.0) {
            break;
        }

        timeline.push(TimelineClip {
            id: Some(format!("seg-{}", timeline.len())),
            source_url: clip.url.clone(),
            in_sec: 0.0,
            out_sec: take,
            start_sec: cumulative,
        });
        cumulative += take;
    }

    tracing::debug!(
        segments = timeline.len(),
        total = cumulative,
        target = target_duration_sec,
        seeded = seed.is_some(),
        "Planned timeline"
    );

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ab() -> Vec<SourceClip> {
        vec![
            SourceClip::new("a", Some(10.0)),
            SourceClip::new("b", Some(5.0)),
        ]
    }

    #[test]
    fn test_empty_inputs_give_empty_timeline() {
        assert!(plan_timeline(&[], 10.0, 1.0, 3.0, None).is_empty());
        assert!(plan_timeline(&ab(), 0.0, 1.0, 3.0, None).is_empty());
        assert!(plan_timeline(&ab(), -5.0, 1.0, 3.0, Some(1)).is_empty());
    }

    #[test]
    fn test_unseeded_keeps_order_and_round_robins() {
        let timeline = plan_timeline(&ab(), 10.0, 1.0, 3.0, None);
        let urls: Vec<&str> = timeline.iter().map(|c| c.source_url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "a", "b"]);
        assert!((timeline[3].out_sec - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_are_contiguous() {
        let timeline = plan_timeline(&ab(), 12.5, 1.5, 3.5, Some(3));
        let mut expected_start = 0.0;
        for clip in &timeline {
            assert!((clip.start_sec - expected_start).abs() < 1e-9);
            assert_eq!(clip.in_sec, 0.0);
            expected_start += clip.duration_sec();
        }
    }

    #[test]
    fn test_short_remainder_is_floored_to_min() {
        let clips = vec![SourceClip::new("a", None)];
        let timeline = plan_timeline(&clips, 7.2, 1.5, 3.5, None);
        let durations: Vec<f64> = timeline.iter().map(|c| c.duration_sec()).collect();
        assert_eq!(durations.len(), 3);
        assert!((durations[2] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_short_known_duration_is_used() {
        let clips = vec![SourceClip::new("short", Some(2.0))];
        let timeline = plan_timeline(&clips, 5.0, 1.0, 3.0, None);
        assert!((timeline[0].duration_sec() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_bounds_are_normalised() {
        let timeline = plan_timeline(&ab(), 6.0, 5.0, 2.0, None);
        assert!(timeline.iter().all(|c| c.duration_sec() <= 2.0 + 1e-9));
    }

    #[test]
    fn test_non_positive_max_stops_immediately() {
        assert!(plan_timeline(&ab(), 6.0, 0.0, 0.0, None).is_empty());
    }

    #[test]
    fn test_duration_alias_deserializes() {
        let clip: SourceClip = serde_json::from_str(r#"{"url":"a","duration":10}"#).unwrap();
        assert_eq!(clip.duration_sec, Some(10.0));
    }
}
