//! Glyph metrics for the standard Type1 fonts we draw with.
//!
//! Widths are in 1/1000 em, taken from the Adobe core AFM files, for the
//! printable ASCII range (WinAnsi 32..=126). Text is passed through
//! [`charmap`](super::charmap) first, so nothing outside that range reaches
//! the measuring code except the `?` fallback.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Font {
    Helvetica,
    HelveticaBold,
    Courier,
}

impl Font {
    pub const ALL: [Font; 3] = [Font::Helvetica, Font::HelveticaBold, Font::Courier];

    /// PostScript name used in the font dictionary.
    pub fn base_font(&self) -> &'static str {
        match self {
            Font::Helvetica => "Helvetica",
            Font::HelveticaBold => "Helvetica-Bold",
            Font::Courier => "Courier",
        }
    }

    /// Name under which the font is registered in page resources.
    pub fn resource_name(&self) -> &'static str {
        match self {
            Font::Helvetica => "F1",
            Font::HelveticaBold => "F2",
            Font::Courier => "F3",
        }
    }

    pub fn glyph_width(&self, c: char) -> u16 {
        let code = c as u32;
        if !(32..=126).contains(&code) {
            return DEFAULT_WIDTH;
        }
        let idx = (code - 32) as usize;
        match self {
            Font::Helvetica => HELVETICA[idx],
            Font::HelveticaBold => HELVETICA_BOLD[idx],
            Font::Courier => COURIER_WIDTH,
        }
    }
}

const DEFAULT_WIDTH: u16 = 556;
const COURIER_WIDTH: u16 = 600;

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,      // 112-126
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 48-63
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 80-95
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // 96-111
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,      // 112-126
];

/// Rendered width of `text` in points.
pub fn text_width(font: Font, size: f32, text: &str) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(font.glyph_width(c))).sum();
    units as f32 * size / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_known_strings() {
        // "Hello" = 722 + 556 + 222 + 222 + 556
        assert!((text_width(Font::Helvetica, 10.0, "Hello") - 22.78).abs() < 0.001);
        assert!((text_width(Font::Courier, 10.0, "abc") - 18.0).abs() < 0.001);
    }

    #[test]
    fn bold_is_wider_than_regular() {
        let text = "Confidential information";
        assert!(text_width(Font::HelveticaBold, 12.0, text) > text_width(Font::Helvetica, 12.0, text));
    }

    #[test]
    fn non_ascii_uses_default_width() {
        assert_eq!(Font::Helvetica.glyph_width('é'), DEFAULT_WIDTH);
        assert_eq!(Font::Helvetica.glyph_width('\u{7f}'), DEFAULT_WIDTH);
    }
}
