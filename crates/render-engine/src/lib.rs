//! Clipflow Render Engine
//!
//! Turns a validated EDL into an encoded video by driving an external
//! encoder through a fixed sequence of stages.
//!
//! # Pipeline Architecture
//!
//! ```text
//! timeline urls ──► Fetch (dedup) ──► Trim (per clip, video only)
//!                                              │
//!                                              ▼
//!                                   Concat (startSec order, stream copy)
//!                                              │
//! overlays ──► ASS captions ──┐                ▼
//! color grade ────────────────┼──► Filter chain (scale/pad, eq, vibrance, ass)
//!                             │                │
//! voiceover / music ──────────┘                ▼
//!                                   Mux (voice | music | amix, -shortest)
//!                                              │
//!                                              ▼
//!                                          output.mp4
//! ```
//!
//! The encoder is a port ([`Encoder`]); [`FfmpegEncoder`] is the production
//! implementation and tests substitute a fake.

pub mod encoder;
pub mod ffmpeg;
pub mod filters;
pub mod orchestrator;
pub mod progress;

pub use encoder::{
    ComposeSpec, EncodeProgress, EncodeProgressFn, Encoder, EncoderCommand, EncoderFailure,
    EncoderFailureKind,
};
pub use ffmpeg::FfmpegEncoder;
pub use filters::{AudioPlan, VideoFilter};
pub use orchestrator::{
    placeholder_video, RenderFailure, RenderOrchestrator, RenderPolicy, RenderQuality,
    RenderSettings, RenderedVideo,
};
pub use progress::{PreviewCallback, ProgressCallback, RenderCallbacks, RenderProgress, RenderStage};
