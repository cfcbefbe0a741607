use crate::config::FontConfig;
use crate::text_metrics;

/// Maps a label to its rendered pixel width.
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> f32;
}

/// Measures with the configured system font, falling back to calibrated
/// per-character widths when no font can be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetrics {
    pub font_family: String,
    pub font_size: f32,
    pub fast: bool,
}

impl FontMetrics {
    pub fn new(font: &FontConfig) -> Self {
        Self {
            font_family: font.font_family.clone(),
            font_size: font.font_size,
            fast: font.fast_text_metrics,
        }
    }
}

impl TextMeasure for FontMetrics {
    fn text_width(&self, text: &str) -> f32 {
        if self.fast && text.is_ascii() {
            return fallback_text_width(text, self.font_size);
        }
        text_metrics::measure_text_width(text, self.font_size, &self.font_family)
            .unwrap_or_else(|| fallback_text_width(text, self.font_size))
    }
}

/// Constant advance per character; deterministic across hosts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedWidth(pub f32);

impl TextMeasure for FixedWidth {
    fn text_width(&self, text: &str) -> f32 {
        text.lines()
            .map(|line| line.chars().count() as f32 * self.0)
            .fold(0.0, f32::max)
    }
}

/// Width of `text` under `measure`; a missing measurer yields a unit width.
pub(crate) fn label_width(text: &str, measure: Option<&dyn TextMeasure>) -> f32 {
    match measure {
        Some(measure) => measure.text_width(text),
        None => 1.0,
    }
}

pub(crate) fn char_width_factor(ch: char) -> f32 {
    // Relative advances of a common sans-serif face, per unit of font size.
    match ch {
        ' ' => 0.306,
        '\\' | '.' | ',' | ':' | ';' | '|' | '!' | '(' | ')' | '[' | ']' | '{' | '}' => 0.321,
        'A' | 'B' | 'K' | 'X' | 'Y' => 0.650,
        'C' | 'D' | 'U' | 'N' => 0.740,
        'E' | 'F' | 'T' | 'L' => 0.580,
        'G' | 'H' | 'O' | 'Q' => 0.750,
        'I' => 0.272,
        'J' => 0.557,
        'M' => 0.903,
        'P' | 'R' | 'S' | 'V' | 'Z' => 0.630,
        'W' => 0.958,
        'a' | 'c' | 'e' | 'k' | 'x' | 'z' => 0.545,
        'b' | 'd' | 'g' | 'h' | 'n' | 'o' | 'p' | 'q' | 'u' | 'y' => 0.590,
        'f' | 't' => 0.320,
        'i' | 'j' | 'l' => 0.235,
        'm' => 0.867,
        'r' => 0.364,
        's' | 'v' => 0.530,
        'w' => 0.811,
        '1' => 0.396,
        '0'..='9' => 0.605,
        '_' | '-' | '=' | '+' | '<' | '>' => 0.584,
        '@' | '#' | '%' | '&' => 0.946,
        _ => 0.568,
    }
}

pub(crate) fn fallback_text_width(text: &str, font_size: f32) -> f32 {
    text.lines()
        .map(|line| line.chars().map(char_width_factor).sum::<f32>() * font_size)
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_width_factor_returns_positive_values() {
        for ch in ['a', 'Z', ' ', '0', '@', '_', '\u{4e2d}'] {
            assert!(char_width_factor(ch) > 0.0, "char {:?} has zero width", ch);
        }
    }

    #[test]
    fn fallback_text_width_scales_with_font_size() {
        let w10 = fallback_text_width("map_0", 10.0);
        let w20 = fallback_text_width("map_0", 20.0);
        assert!((w20 - w10 * 2.0).abs() < 0.01);
    }

    #[test]
    fn fixed_width_uses_widest_line() {
        let measure = FixedWidth(5.0);
        assert_eq!(measure.text_width("abc\nabcdef"), 30.0);
        assert_eq!(label_width("abc", Some(&measure)), 15.0);
        assert_eq!(label_width("abc", None), 1.0);
    }

    #[test]
    fn fast_metrics_skip_font_lookup() {
        let metrics = FontMetrics {
            font_family: "does-not-exist".to_string(),
            font_size: 10.0,
            fast: true,
        };
        assert_eq!(metrics.text_width("tasklet"), fallback_text_width("tasklet", 10.0));
    }
}
