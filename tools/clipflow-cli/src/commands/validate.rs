//! Validate an EDL document.

use std::path::PathBuf;

use anyhow::Context;
use clipflow_edl::EdlError;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating EDL at: {}", path.display());

    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match clipflow_edl::parse_edl(&json) {
        Ok(edl) => {
            println!("  Version: {}", edl.version);
            println!(
                "  Output: {}x{} @ {} fps",
                edl.output.width, edl.output.height, edl.output.fps
            );
            println!(
                "  Timeline: {} clip(s), {} source(s), {:.2}s",
                edl.timeline.len(),
                edl.distinct_source_urls().len(),
                edl.duration_sec()
            );
            println!("  Overlays: {}", edl.overlays.len());
            println!(
                "  Audio: voiceover {}, music {}",
                if edl.audio.has_voiceover() { "yes" } else { "no" },
                if edl.audio.music_active() { "yes" } else { "no" }
            );
            println!("\nEDL is valid.");
            Ok(())
        }
        Err(EdlError::Invalid { issues }) => {
            println!("\nValidation issues:");
            for issue in &issues {
                println!("  - {issue}");
            }
            anyhow::bail!("{} issue(s) found", issues.len())
        }
        Err(e) => Err(e.into()),
    }
}
