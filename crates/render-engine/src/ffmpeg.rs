//! ffmpeg-backed encoder.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use clipflow_common::us_to_secs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::encoder::{
    ComposeSpec, EncodeProgress, EncodeProgressFn, Encoder, EncoderCommand, EncoderFailure,
    EncoderFailureKind,
};

const STDERR_TAIL_CHARS: usize = 2000;

/// Runs commands through the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegEncoder {
    /// Use `binary` (resolved through PATH when not absolute).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Argument vector for a command.
    pub fn args(command: &EncoderCommand) -> Vec<String> {
        let mut args = base_args();
        match command {
            EncoderCommand::Trim {
                input,
                output,
                start_sec,
                duration_sec,
            } => {
                args.extend([
                    "-ss".to_string(),
                    format!("{start_sec:.3}"),
                    "-i".to_string(),
                    path_arg(input),
                    "-t".to_string(),
                    format!("{duration_sec:.3}"),
                    "-an".to_string(),
                    "-c:v".to_string(),
                    "libx264".to_string(),
                    "-preset".to_string(),
                    "veryfast".to_string(),
                    "-pix_fmt".to_string(),
                    "yuv420p".to_string(),
                    path_arg(output),
                ]);
            }
            EncoderCommand::Concat { list_file, output } => {
                args.extend([
                    "-f".to_string(),
                    "concat".to_string(),
                    "-safe".to_string(),
                    "0".to_string(),
                    "-i".to_string(),
                    path_arg(list_file),
                    "-c".to_string(),
                    "copy".to_string(),
                    path_arg(output),
                ]);
            }
            EncoderCommand::Compose(spec) => compose_args(spec, &mut args),
            EncoderCommand::ExtractFrame {
                input,
                output,
                at_sec,
                width,
            } => {
                args.extend([
                    "-ss".to_string(),
                    format!("{at_sec:.3}"),
                    "-i".to_string(),
                    path_arg(input),
                    "-frames:v".to_string(),
                    "1".to_string(),
                    "-vf".to_string(),
                    format!("scale={}:-2", (*width).max(2)),
                    "-q:v".to_string(),
                    "4".to_string(),
                    path_arg(output),
                ]);
            }
        }
        args
    }
}

fn base_args() -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostats".to_string(),
    ]
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn compose_args(spec: &ComposeSpec, args: &mut Vec<String>) {
    args.extend(["-progress".to_string(), "pipe:1".to_string()]);
    args.extend(["-i".to_string(), path_arg(&spec.video)]);
    if let Some(voice) = &spec.voice {
        args.extend(["-i".to_string(), path_arg(voice)]);
    }
    if let Some(music) = &spec.music {
        args.extend(["-i".to_string(), path_arg(music)]);
    }

    let mut graph = format!("[0:v]{}[vout]", spec.video_filter);
    let audio_graph = spec.audio.filter_graph();
    if let Some(audio) = &audio_graph {
        graph.push(';');
        graph.push_str(audio);
    }

    args.extend([
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        "[vout]".to_string(),
    ]);
    if audio_graph.is_some() {
        args.extend(["-map".to_string(), "[aout]".to_string()]);
    }

    args.extend([
        "-r".to_string(),
        spec.fps.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        format!("{}k", spec.video_bitrate_kbps.max(250)),
    ]);
    if audio_graph.is_some() {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", spec.audio_bitrate_kbps.max(64)),
        ]);
    }
    args.extend([
        "-shortest".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(&spec.output),
    ]);
}

/// Accumulates `-progress` key/value lines.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    /// Apply one `key=value` line. Returns true at the end of a progress block.
    fn update(&mut self, key: &str, value: &str) -> bool {
        match key {
            // out_time_ms is reported in microseconds as well.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<i64>() {
                    self.out_time_secs = us_to_secs(us.max(0));
                }
                false
            }
            "progress" => {
                self.complete = value.trim() == "end";
                true
            }
            _ => false,
        }
    }

    fn sample(&self) -> EncodeProgress {
        EncodeProgress {
            out_time_secs: self.out_time_secs,
            complete: self.complete,
        }
    }
}

fn tail(text: &str) -> &str {
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL_CHARS - 1)
        .map_or(0, |(i, _)| i);
    &text[start..]
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn run(
        &self,
        command: &EncoderCommand,
        progress: Option<EncodeProgressFn>,
    ) -> Result<(), EncoderFailure> {
        let args = Self::args(command);
        tracing::debug!(command = command.label(), args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let kind = if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderFailureKind::Unavailable
                } else {
                    EncoderFailureKind::Spawn
                };
                EncoderFailure::new(kind, format!("{}: {e}", self.binary))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            EncoderFailure::new(EncoderFailureKind::Io, "failed to capture ffmpeg stdout")
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            EncoderFailure::new(EncoderFailureKind::Io, "failed to capture ffmpeg stderr")
        })?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        loop {
            let line = lines.next_line().await.map_err(|e| {
                EncoderFailure::new(
                    EncoderFailureKind::Io,
                    format!("failed reading ffmpeg progress: {e}"),
                )
            })?;
            let Some(line) = line else { break };
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            if state.update(key, value) {
                if let Some(cb) = &progress {
                    cb(state.sample());
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            EncoderFailure::new(EncoderFailureKind::Io, format!("failed to wait on ffmpeg: {e}"))
        })?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(EncoderFailure::new(
                EncoderFailureKind::NonZeroExit,
                format!("ffmpeg {} failed ({status}): {}", command.label(), tail(&stderr_output)),
            ));
        }

        tracing::debug!(command = command.label(), "ffmpeg finished");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}
