use clipflow_edl::{
    parse_edl, validate, AudioMix, ColorGrade, Edl, OutputFormat, OverlayPosition, TextOverlay,
    TimelineClip, EDL_VERSION,
};
use proptest::prelude::*;
use serde_json::json;

fn contiguous_timeline(durations: &[f64]) -> Vec<TimelineClip> {
    let mut start = 0.0;
    durations
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            let clip = TimelineClip {
                id: Some(format!("clip-{i}")),
                source_url: format!("blob://clips/{i}.mp4"),
                in_sec: 0.5,
                out_sec: 0.5 + d,
                start_sec: start,
            };
            start += d;
            clip
        })
        .collect()
}

fn position_strategy() -> impl Strategy<Value = OverlayPosition> {
    prop_oneof![
        Just(OverlayPosition::Top),
        Just(OverlayPosition::Center),
        Just(OverlayPosition::Bottom),
    ]
}

prop_compose! {
    fn edl_strategy()(
        durations in prop::collection::vec(0.1f64..20.0, 1..8),
        overlay in prop::option::of((0.0f64..5.0, 0.1f64..5.0, position_strategy())),
        voice in prop::option::of(0.0f64..=1.0),
        music in prop::option::of(0.0f64..=1.0),
        saturation in 0.0f64..2.0,
        fps in 1u32..120,
    ) -> Edl {
        Edl {
            version: EDL_VERSION,
            timeline: contiguous_timeline(&durations),
            overlays: overlay
                .map(|(start, len, position)| TextOverlay {
                    id: None,
                    text: "Watch this {now}\\".to_string(),
                    start_sec: start,
                    end_sec: start + len,
                    position,
                    style_preset: Some("yellow".to_string()),
                })
                .into_iter()
                .collect(),
            audio: AudioMix {
                voiceover_url: "blob://voice.mp3".to_string(),
                music_url: music.map(|_| "blob://music.mp3".to_string()),
                voice_volume: voice,
                music_volume: music,
                music_enabled: music.map(|_| true),
                voice_gain_db: None,
                music_gain_db: Some(-18.0),
            },
            color: Some(ColorGrade { saturation, contrast: 1.0, vibrance: 1.0 }),
            output: OutputFormat { width: 1080, height: 1920, fps },
        }
    }
}

proptest! {
    #[test]
    fn valid_documents_survive_serialization(edl in edl_strategy()) {
        let json = edl.to_json_pretty().unwrap();
        let parsed = parse_edl(&json).unwrap();
        prop_assert_eq!(&parsed, &edl);

        // Default-filling is idempotent.
        let again = parse_edl(&parsed.to_json_pretty().unwrap()).unwrap();
        prop_assert_eq!(again, parsed);
    }

    #[test]
    fn shifted_start_is_always_rejected(
        durations in prop::collection::vec(0.5f64..10.0, 2..6),
        shift in 0.01f64..1.0,
    ) {
        let mut timeline = contiguous_timeline(&durations);
        let last = timeline.len() - 1;
        timeline[last].start_sec += shift;
        let edl = Edl {
            version: EDL_VERSION,
            timeline,
            overlays: vec![],
            audio: AudioMix::voiceover(""),
            color: None,
            output: OutputFormat { width: 1920, height: 1080, fps: 30 },
        };
        let issues = edl.issues();
        let expected_path = format!("timeline[{last}].startSec");
        prop_assert!(issues.iter().any(|i| i.path == expected_path));
    }
}

#[test]
fn omitted_overlays_and_fps_are_filled() {
    let raw = json!({
        "timeline": [
            { "sourceUrl": "https://cdn.example.com/a.mp4", "inSec": 0, "outSec": 3, "startSec": 0 }
        ],
        "audio": { "voiceoverUrl": "" },
        "output": { "width": 1080, "height": 1920 }
    });

    let edl = validate(&raw).unwrap();
    assert!(edl.overlays.is_empty());
    assert_eq!(edl.output.fps, 30);

    let value = serde_json::to_value(&edl).unwrap();
    assert_eq!(value["overlays"], json!([]));
    assert_eq!(value["output"]["fps"], json!(30));
}
