use clipflow_auto_edit::{build_edl, plan_timeline, EdlBuildOptions, SourceClip};
use proptest::prelude::*;

const EPS: f64 = 1e-6;

fn clip_strategy() -> impl Strategy<Value = SourceClip> {
    ("[a-z]{1,6}", prop::option::of(0.2f64..30.0))
        .prop_map(|(name, duration)| SourceClip::new(format!("blob://{name}.mp4"), duration))
}

#[test]
fn scenario_two_clips_six_seconds() {
    let clips = vec![
        SourceClip::new("a", Some(10.0)),
        SourceClip::new("b", Some(5.0)),
    ];
    let timeline = plan_timeline(&clips, 6.0, 1.5, 3.5, Some(42));

    assert!(timeline.len() >= 2);
    let total: f64 = timeline.iter().map(|c| c.duration_sec()).sum();
    assert!(total >= 6.0 - EPS);
    for clip in &timeline {
        let d = clip.duration_sec();
        assert!((1.5 - EPS..=3.5 + EPS).contains(&d), "segment {d} out of bounds");
    }
}

#[test]
fn planned_edl_passes_validation() {
    let mut options = EdlBuildOptions::new(
        vec![
            SourceClip::new("blob://a.mp4", Some(10.0)),
            SourceClip::new("blob://b.mp4", None),
        ],
        20.0,
    );
    options.seed = Some(5);
    options.hook_text = Some("You won't believe {this}".into());
    let edl = build_edl(options).unwrap();

    let json = edl.to_json_pretty().unwrap();
    let parsed = clipflow_edl::parse_edl(&json).unwrap();
    assert_eq!(parsed.timeline.len(), edl.timeline.len());
}

proptest! {
    #[test]
    fn empty_or_non_positive_gives_nothing(
        clips in prop::collection::vec(clip_strategy(), 0..5),
        target in -50.0f64..=0.0,
        seed in prop::option::of(any::<u64>()),
    ) {
        prop_assert!(plan_timeline(&clips, target, 1.0, 3.0, seed).is_empty());
        prop_assert!(plan_timeline(&[], target.abs() + 1.0, 1.0, 3.0, seed).is_empty());
    }

    #[test]
    fn long_sources_stay_within_bounds(
        count in 1usize..6,
        target in 0.5f64..120.0,
        min in 0.5f64..3.0,
        span in 0.0f64..5.0,
        seed in prop::option::of(any::<u64>()),
    ) {
        let max = min + span;
        let clips: Vec<SourceClip> = (0..count)
            .map(|i| SourceClip::new(format!("clip-{i}"), Some(max + 1.0)))
            .collect();
        let timeline = plan_timeline(&clips, target, min, max, seed);

        let total: f64 = timeline.iter().map(|c| c.duration_sec()).sum();
        prop_assert!(total >= target - EPS);
        for clip in &timeline {
            let d = clip.duration_sec();
            prop_assert!(d >= min - EPS && d <= max + EPS);
        }
    }

    #[test]
    fn same_seed_same_timeline(
        clips in prop::collection::vec(clip_strategy(), 1..8),
        target in 1.0f64..60.0,
        seed in any::<u64>(),
    ) {
        let a = plan_timeline(&clips, target, 1.5, 3.5, Some(seed));
        let b = plan_timeline(&clips, target, 1.5, 3.5, Some(seed));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn timeline_is_contiguous(
        clips in prop::collection::vec(clip_strategy(), 1..8),
        target in 1.0f64..60.0,
        seed in prop::option::of(any::<u64>()),
    ) {
        let timeline = plan_timeline(&clips, target, 1.0, 4.0, seed);
        let mut cumulative = 0.0;
        for clip in &timeline {
            prop_assert!((clip.start_sec - cumulative).abs() < EPS);
            cumulative += clip.duration_sec();
        }
    }
}
