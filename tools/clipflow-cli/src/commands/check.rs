//! Check the local setup.

use std::time::Duration;

use bytes::Bytes;
use clipflow_common::AppConfig;
use clipflow_render_engine::{Encoder, FfmpegEncoder};
use clipflow_render_queue::MEMORY_BROKER_URL;
use clipflow_services::{generator_from_config, synthesizer_from_config, BlobStore, LocalBlobStore};

const WRITE_CHECK_KEY: &str = "user-assets/clipflow-check/write-check.txt";

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Clipflow System Check");
    println!("{}", "=".repeat(50));
    let mut required_ok = true;

    let encoder = FfmpegEncoder::new(&config.render.ffmpeg_path);
    if encoder.is_available().await {
        println!("[OK] Encoder: {}", config.render.ffmpeg_path);
    } else {
        required_ok = false;
        println!(
            "[FAIL] Encoder: '{}' not runnable (set render.ffmpeg_path or CLIPFLOW_FFMPEG)",
            config.render.ffmpeg_path
        );
    }

    let root = &config.storage.root;
    match LocalBlobStore::new(root).await {
        Ok(store) => {
            let written = store
                .put(WRITE_CHECK_KEY, Bytes::from_static(b"ok"), "text/plain")
                .await;
            match written {
                Ok(_) => {
                    store.delete(WRITE_CHECK_KEY).await.ok();
                    println!("[OK] Storage: {} (writable)", root.display());
                }
                Err(e) => {
                    required_ok = false;
                    println!("[FAIL] Storage: {} not writable: {e}", root.display());
                }
            }
        }
        Err(e) => {
            required_ok = false;
            println!("[FAIL] Storage: {}: {e}", root.display());
        }
    }

    match config.queue.broker_url.as_deref() {
        None => println!("[OK] Render queue: inline (no broker configured)"),
        Some(MEMORY_BROKER_URL) => println!(
            "[OK] Render queue: in-process broker, {} worker(s), {} attempt(s)",
            config.queue.concurrency, config.queue.max_attempts
        ),
        Some(other) => {
            required_ok = false;
            println!("[FAIL] Render queue: unsupported broker URL '{other}'");
        }
    }

    let env = |key: &str| std::env::var(key).ok();
    match synthesizer_from_config(&config.voice, Duration::from_secs(1), env) {
        Ok(Some(_)) => println!(
            "[OK] Voice: {} provider",
            config.voice.provider.as_deref().unwrap_or_default()
        ),
        Ok(None) => println!("[WARN] Voice: no provider configured; voice steps will fail"),
        Err(e) => println!("[WARN] Voice: {e}"),
    }
    match generator_from_config(&config.text, Duration::from_secs(1), env) {
        Ok(Some(_)) => println!("[OK] Text: model {}", config.text.default_model),
        Ok(None) => println!("[WARN] Text: no endpoint configured; AI steps will fail"),
        Err(e) => println!("[WARN] Text: {e}"),
    }

    println!();
    if required_ok {
        println!("All required capabilities are available. Clipflow is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }
    Ok(())
}
