//! Build the ASS caption track for an EDL.

use std::path::PathBuf;

use clipflow_captions::{build_caption_track, save_caption_track};

use super::load_edl;

pub fn run(path: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let edl = load_edl(&path)?;
    if edl.overlays.is_empty() {
        eprintln!("EDL has no text overlays; caption track is empty.");
        return Ok(());
    }

    match output {
        Some(out) => {
            save_caption_track(&edl, &out)?;
            eprintln!("Wrote {} caption(s) to {}", edl.overlays.len(), out.display());
        }
        None => print!("{}", build_caption_track(&edl)),
    }
    Ok(())
}
