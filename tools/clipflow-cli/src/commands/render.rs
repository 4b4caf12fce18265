//! Render an EDL to a video file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clipflow_common::AppConfig;
use clipflow_render_engine::{
    FfmpegEncoder, RenderCallbacks, RenderOrchestrator, RenderPolicy, RenderQuality,
    RenderSettings,
};
use clipflow_render_queue::overall_progress;

use super::{load_edl, local_storage};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: PathBuf,
    draft: bool,
    voiceover: Option<PathBuf>,
    strict: bool,
) -> anyhow::Result<()> {
    let edl = load_edl(&path)?;
    let (_, fetcher) = local_storage(config).await?;

    let voiceover = match voiceover {
        Some(file) => Some(Bytes::from(
            std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?,
        )),
        None => None,
    };

    let quality = if draft {
        RenderQuality::Draft
    } else {
        RenderQuality::Final
    };
    let policy = if strict {
        RenderPolicy::Propagate
    } else {
        RenderPolicy::from_degrade_flag(config.queue.degrade_on_failure)
    };

    println!("Rendering {}", path.display());
    println!("  Output: {}", output.display());
    println!(
        "  Format: {}x{} @ {} fps, {:.2}s, {:?}",
        edl.output.width,
        edl.output.height,
        edl.output.fps,
        edl.duration_sec(),
        quality
    );

    let orchestrator = RenderOrchestrator::new(
        Arc::new(FfmpegEncoder::new(&config.render.ffmpeg_path)),
        fetcher,
        RenderSettings::from(&config.render),
    );
    let callbacks = RenderCallbacks::none().with_progress(|p| {
        print!(
            "\r  Progress: {:>5.1}% ({:?})        ",
            overall_progress(p) * 100.0,
            p.stage
        );
        std::io::stdout().flush().ok();
    });

    let video = orchestrator
        .render_with_policy(&edl, voiceover, quality, callbacks, policy)
        .await
        .context("Render failed")?;
    println!();

    std::fs::write(&output, &video.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if video.placeholder {
        println!("Render failed; wrote a placeholder to {}", output.display());
    } else {
        println!(
            "Render complete: {} ({} bytes)",
            output.display(),
            video.bytes.len()
        );
    }
    Ok(())
}
