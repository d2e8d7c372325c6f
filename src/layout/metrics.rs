use super::LayoutError;

/// Horizontal extent of a string plus the font's vertical metrics at a size.
///
/// `descent` is a positive distance below the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl TextMetrics {
    pub fn line_height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// Coverage mask for one glyph, positioned relative to the top-left corner
/// of the line box (baseline at `ascent`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphBitmap {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
    /// Row-major coverage, one byte per pixel
    pub coverage: Vec<u8>,
}

/// Measures text for wrapping and alignment.
pub trait FontMetricsProvider {
    fn measure(&self, text: &str, font: &str, size: f32) -> Result<TextMetrics, LayoutError>;
}

/// A metrics provider that can also produce glyph coverage for drawing.
pub trait TextRasterizer: FontMetricsProvider {
    fn rasterize(&self, text: &str, font: &str, size: f32)
        -> Result<Vec<GlyphBitmap>, LayoutError>;
}

impl<T: FontMetricsProvider + ?Sized> FontMetricsProvider for &T {
    fn measure(&self, text: &str, font: &str, size: f32) -> Result<TextMetrics, LayoutError> {
        (**self).measure(text, font, size)
    }
}

impl<T: TextRasterizer + ?Sized> TextRasterizer for &T {
    fn rasterize(
        &self,
        text: &str,
        font: &str,
        size: f32,
    ) -> Result<Vec<GlyphBitmap>, LayoutError> {
        (**self).rasterize(text, font, size)
    }
}

/// Fixed-advance metrics with solid block glyphs.
///
/// Every character advances `size * 0.5`; ascent is `size * 0.8` and descent
/// `size * 0.2`. Layout computed with this backend is exact and independent
/// of installed fonts, which makes it the backend of choice for tests.
#[derive(Debug, Clone, Default)]
pub struct MonospaceMetrics {
    known_fonts: Option<Vec<String>>,
}

impl MonospaceMetrics {
    pub const ADVANCE: f32 = 0.5;
    pub const ASCENT: f32 = 0.8;
    pub const DESCENT: f32 = 0.2;

    /// Accept any font name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only the listed font names; any other is `FontUnavailable`.
    pub fn with_fonts<I, S>(fonts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_fonts: Some(fonts.into_iter().map(Into::into).collect()),
        }
    }

    fn check_font(&self, font: &str) -> Result<(), LayoutError> {
        match &self.known_fonts {
            Some(known) if !known.iter().any(|f| f == font) => {
                Err(LayoutError::FontUnavailable {
                    font: font.to_string(),
                    reason: "not registered".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl FontMetricsProvider for MonospaceMetrics {
    fn measure(&self, text: &str, font: &str, size: f32) -> Result<TextMetrics, LayoutError> {
        self.check_font(font)?;
        Ok(TextMetrics {
            width: text.chars().count() as f32 * size * Self::ADVANCE,
            ascent: size * Self::ASCENT,
            descent: size * Self::DESCENT,
        })
    }
}

impl TextRasterizer for MonospaceMetrics {
    fn rasterize(
        &self,
        text: &str,
        font: &str,
        size: f32,
    ) -> Result<Vec<GlyphBitmap>, LayoutError> {
        self.check_font(font)?;
        let advance = size * Self::ADVANCE;
        let width = (advance.round() as usize).saturating_sub(1).max(1);
        let height = ((size * Self::ASCENT).round() as usize).max(1);

        Ok(text
            .chars()
            .enumerate()
            .filter(|(_, ch)| !ch.is_whitespace())
            .map(|(i, _)| GlyphBitmap {
                x: (i as f32 * advance).round() as i32,
                y: 0,
                width,
                height,
                coverage: vec![255; width * height],
            })
            .collect())
    }
}
