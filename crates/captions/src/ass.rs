//! ASS document generation.

use std::fmt::Write as _;
use std::path::Path;

use clipflow_common::ClipflowResult;
use clipflow_edl::{Edl, OverlayPosition, TextOverlay};

use crate::style::CaptionStyle;

const EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

const STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
     OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, \
     Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";

/// Build the caption track for an EDL.
///
/// Returns an empty string when the EDL has no overlays.
pub fn build_caption_track(edl: &Edl) -> String {
    if edl.overlays.is_empty() {
        return String::new();
    }

    let mut doc = String::new();
    doc.push_str("[Script Info]\n");
    doc.push_str("ScriptType: v4.00+\n");
    doc.push_str("WrapStyle: 0\n");
    doc.push_str("ScaledBorderAndShadow: yes\n");
    let _ = writeln!(doc, "PlayResX: {}", edl.output.width);
    let _ = writeln!(doc, "PlayResY: {}", edl.output.height);
    doc.push('\n');

    doc.push_str("[V4+ Styles]\n");
    doc.push_str(STYLE_FORMAT);
    doc.push('\n');
    for style in CaptionStyle::ALL {
        doc.push_str(&style.definition(edl.output.height));
        doc.push('\n');
    }
    doc.push('\n');

    doc.push_str("[Events]\n");
    doc.push_str(EVENT_FORMAT);
    doc.push('\n');

    let mut overlays: Vec<&TextOverlay> = edl.overlays.iter().collect();
    overlays.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));

    for overlay in overlays {
        let style = CaptionStyle::from_preset(overlay.style_preset.as_deref());
        let _ = writeln!(
            doc,
            "Dialogue: 0,{},{},{},,0,0,0,,{}{}",
            format_ass_time(overlay.start_sec),
            format_ass_time(overlay.end_sec),
            style.name(),
            alignment_tag(overlay.position),
            escape_text(&overlay.text),
        );
    }

    doc
}

/// Write the caption track next to the other render scratch files.
pub fn save_caption_track(edl: &Edl, path: &Path) -> ClipflowResult<()> {
    std::fs::write(path, build_caption_track(edl))?;
    Ok(())
}

/// Format seconds as an ASS timestamp: `H:MM:SS.cc`.
pub fn format_ass_time(secs: f64) -> String {
    let total_cs = (secs.max(0.0) * 100.0).round() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6000;
    let seconds = (total_cs % 6000) / 100;
    let centis = total_cs % 100;
    format!("{hours}:{minutes:02}:{seconds:02}.{centis:02}")
}

/// Escape the characters ASS reserves in dialogue text.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' => out.push_str("\\N"),
            other => out.push(other),
        }
    }
    out
}

fn alignment_tag(position: OverlayPosition) -> &'static str {
    // Numpad layout: 8 top-center, 5 middle-center, 2 bottom-center.
    match position {
        OverlayPosition::Top => "{\\an8}",
        OverlayPosition::Center => "{\\an5}",
        OverlayPosition::Bottom => "{\\an2}",
    }
}
