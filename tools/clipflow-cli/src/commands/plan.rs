//! Plan an EDL from a clip list.

use std::path::PathBuf;

use anyhow::Context;
use clipflow_auto_edit::{build_edl, AspectRatio, EdlBuildOptions, SourceClip};
use serde_json::Value;

pub struct PlanArgs {
    pub clips: PathBuf,
    pub target: f64,
    pub min_clip: f64,
    pub max_clip: f64,
    pub aspect: String,
    pub seed: Option<u64>,
    pub hook: Option<String>,
    pub voiceover: Option<String>,
    pub music: Option<String>,
    pub output: Option<PathBuf>,
}

pub fn run(args: PlanArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.clips)
        .with_context(|| format!("Failed to read {}", args.clips.display()))?;
    let clips = parse_clips(&raw)?;

    let mut options = EdlBuildOptions::new(clips, args.target);
    options.min_clip_sec = args.min_clip;
    options.max_clip_sec = args.max_clip;
    options.aspect_ratio = args.aspect.parse::<AspectRatio>()?;
    options.seed = args.seed;
    options.hook_text = args.hook;
    options.voiceover_url = args.voiceover;
    options.music_url = args.music;

    let edl = build_edl(options)?;
    let json = edl.to_json_pretty()?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Planned {} segment(s), {:.2}s at {}x{} -> {}",
                edl.timeline.len(),
                edl.duration_sec(),
                edl.output.width,
                edl.output.height,
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Clips as `{"url", "durationSec"}` objects or bare URL strings.
fn parse_clips(raw: &str) -> anyhow::Result<Vec<SourceClip>> {
    let value: Value = serde_json::from_str(raw).context("Clip list is not valid JSON")?;
    let Value::Array(items) = value else {
        anyhow::bail!("Clip list must be a JSON array");
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(url) => Ok(SourceClip::new(url, None)),
            other => serde_json::from_value(other).context("Bad clip entry"),
        })
        .collect()
}
