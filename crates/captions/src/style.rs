//! Named caption styles.

/// Caption look selected by an overlay's `stylePreset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptionStyle {
    /// Heavy white text with a dark outline and drop shadow.
    #[default]
    BoldWhite,
    /// Yellow text with a black outline.
    Yellow,
    /// Small text on a translucent box, meant for the lower third.
    LowerThird,
}

impl CaptionStyle {
    pub const ALL: [CaptionStyle; 3] = [Self::BoldWhite, Self::Yellow, Self::LowerThird];

    /// Resolve a preset name. Unknown or missing presets fall back to bold white.
    pub fn from_preset(preset: Option<&str>) -> Self {
        match preset.map(str::trim) {
            Some("yellow") => Self::Yellow,
            Some("minimal_lower_third") => Self::LowerThird,
            _ => Self::BoldWhite,
        }
    }

    /// Style name as it appears in the `[V4+ Styles]` table.
    pub fn name(self) -> &'static str {
        match self {
            Self::BoldWhite => "BoldWhite",
            Self::Yellow => "Yellow",
            Self::LowerThird => "LowerThird",
        }
    }

    /// `Style:` line for a frame of the given height.
    pub(crate) fn definition(self, play_res_y: u32) -> String {
        // Colours are &HAABBGGRR.
        let (size_ratio, primary, outline_colour, back, bold, border_style, outline, shadow) =
            match self {
                Self::BoldWhite => (0.055, "&H00FFFFFF", "&H00000000", "&H80000000", -1, 1, 4, 2),
                Self::Yellow => (0.055, "&H0000FFFF", "&H00000000", "&H80000000", -1, 1, 4, 1),
                Self::LowerThird => (0.035, "&H00FFFFFF", "&H00000000", "&H99000000", 0, 3, 2, 0),
            };
        let font_size = ((play_res_y as f64) * size_ratio).round().max(1.0) as u32;
        let margin_v = ((play_res_y as f64) * 0.08).round() as u32;

        format!(
            "Style: {name},Arial,{font_size},{primary},{primary},{outline_colour},{back},\
             {bold},0,0,0,100,100,0,0,{border_style},{outline},{shadow},2,60,60,{margin_v},1",
            name = self.name(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        assert_eq!(CaptionStyle::from_preset(None), CaptionStyle::BoldWhite);
        assert_eq!(CaptionStyle::from_preset(Some("yellow")), CaptionStyle::Yellow);
        assert_eq!(
            CaptionStyle::from_preset(Some("minimal_lower_third")),
            CaptionStyle::LowerThird
        );
        assert_eq!(CaptionStyle::from_preset(Some("neon")), CaptionStyle::BoldWhite);
    }

    #[test]
    fn test_definition_scales_font() {
        let line = CaptionStyle::BoldWhite.definition(1920);
        assert!(line.starts_with("Style: BoldWhite,Arial,106,"));
    }
}
