//! Clipflow Captions
//!
//! Converts the text overlays of an EDL into an Advanced SubStation Alpha
//! (ASS v4+) document that the encoder burns into the video.

pub mod ass;
pub mod style;

pub use ass::{build_caption_track, escape_text, format_ass_time, save_caption_track};
pub use style::CaptionStyle;
