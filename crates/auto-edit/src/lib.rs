//! Clipflow Auto-Edit
//!
//! Turns a pile of raw clips and a target length into a playable EDL:
//! - **Rng:** Small seeded LCG so the same seed always gives the same cut
//! - **Planner:** Round-robin segment planning bounded by min/max clip length
//! - **Builder:** Wraps a planned timeline with output format, hook text, and audio defaults

pub mod builder;
pub mod planner;
pub mod rng;

pub use builder::{build_edl, AspectRatio, BuildError, EdlBuildOptions, HOOK_DURATION_SECS};
pub use planner::{plan_timeline, PlannedSegment, SourceClip, MAX_SEGMENTS};
pub use rng::Lcg;
