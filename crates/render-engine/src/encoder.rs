//! The encoder port.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::filters::AudioPlan;

/// One invocation of the external encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderCommand {
    /// Cut `[start_sec, start_sec + duration_sec)` of `input`, video only.
    Trim {
        input: PathBuf,
        output: PathBuf,
        start_sec: f64,
        duration_sec: f64,
    },

    /// Losslessly join the files listed in a concat list.
    Concat { list_file: PathBuf, output: PathBuf },

    /// Apply the filter chain and mux audio.
    Compose(ComposeSpec),

    /// Grab a single JPEG frame at `at_sec`.
    ExtractFrame {
        input: PathBuf,
        output: PathBuf,
        at_sec: f64,
        width: u32,
    },
}

impl EncoderCommand {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Trim { .. } => "trim",
            Self::Concat { .. } => "concat",
            Self::Compose(_) => "compose",
            Self::ExtractFrame { .. } => "extract_frame",
        }
    }

    /// File the command writes.
    pub fn output(&self) -> &PathBuf {
        match self {
            Self::Trim { output, .. }
            | Self::Concat { output, .. }
            | Self::ExtractFrame { output, .. } => output,
            Self::Compose(spec) => &spec.output,
        }
    }
}

/// Final compose-and-mux step.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeSpec {
    /// Concatenated, video-only timeline.
    pub video: PathBuf,
    pub voice: Option<PathBuf>,
    pub music: Option<PathBuf>,
    /// Video filter chain applied to the first input.
    pub video_filter: String,
    pub audio: AudioPlan,
    pub fps: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    /// Expected output length, used for progress.
    pub duration_sec: f64,
    pub output: PathBuf,
}

/// A progress sample streamed while a command runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeProgress {
    /// Output timestamp reached so far.
    pub out_time_secs: f64,
    /// The encoder reported completion.
    pub complete: bool,
}

/// Receives [`EncodeProgress`] samples.
pub type EncodeProgressFn = Arc<dyn Fn(EncodeProgress) + Send + Sync>;

/// Why an encoder command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFailureKind {
    /// The encoder binary is not installed.
    Unavailable,
    /// The process could not be started.
    Spawn,
    /// The process exited unsuccessfully.
    NonZeroExit,
    /// Reading or writing files around the process failed.
    Io,
}

impl fmt::Display for EncoderFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unavailable => "encoder unavailable",
            Self::Spawn => "failed to start encoder",
            Self::NonZeroExit => "encoder exited with an error",
            Self::Io => "encoder I/O error",
        })
    }
}

/// Structured encoder failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EncoderFailure {
    pub kind: EncoderFailureKind,
    pub message: String,
}

impl EncoderFailure {
    pub fn new(kind: EncoderFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Runs encoder commands.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Execute a command, streaming progress to `progress` when given.
    async fn run(
        &self,
        command: &EncoderCommand,
        progress: Option<EncodeProgressFn>,
    ) -> Result<(), EncoderFailure>;

    /// Check if this encoder can run on the system.
    async fn is_available(&self) -> bool;

    /// Encoder name.
    fn name(&self) -> &str;
}
