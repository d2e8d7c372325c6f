use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use fontdue::{Font, FontSettings};

use super::metrics::{FontMetricsProvider, GlyphBitmap, TextMetrics, TextRasterizer};
use super::LayoutError;

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc"];

/// TrueType/OpenType backend built on `fontdue`.
///
/// Font references are file names resolved against `fonts_dir` (an absolute
/// path is used as-is; a bare name also tries the `.ttf`, `.otf` and `.ttc`
/// extensions). Parsed fonts are cached and shared across render threads.
pub struct FontdueBackend {
    fonts_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Font>>>,
}

impl FontdueBackend {
    pub fn new(fonts_dir: &Path) -> Self {
        Self {
            fonts_dir: fonts_dir.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn font(&self, name: &str) -> Result<Arc<Font>, LayoutError> {
        if let Some(font) = self.cache.read().ok().and_then(|c| c.get(name).cloned()) {
            return Ok(font);
        }

        let unavailable = |reason: String| LayoutError::FontUnavailable {
            font: name.to_string(),
            reason,
        };
        let path = self
            .resolve(name)
            .ok_or_else(|| unavailable(format!("not found in {}", self.fonts_dir.display())))?;
        let bytes = std::fs::read(&path)
            .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;

        log::debug!("Loaded font {name} from {}", path.display());
        let font = Arc::new(font);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(name.to_string(), Arc::clone(&font));
        }
        Ok(font)
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() {
            return direct.is_file().then(|| direct.to_path_buf());
        }
        let candidate = self.fonts_dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if direct.extension().is_some() {
            return None;
        }
        FONT_EXTENSIONS
            .iter()
            .map(|ext| candidate.with_extension(ext))
            .find(|path| path.is_file())
    }
}

fn vertical_metrics(font: &Font, size: f32) -> (f32, f32) {
    match font.horizontal_line_metrics(size) {
        Some(line) => (line.ascent, -line.descent),
        None => (size * 0.8, size * 0.2),
    }
}

impl FontMetricsProvider for FontdueBackend {
    fn measure(&self, text: &str, font: &str, size: f32) -> Result<TextMetrics, LayoutError> {
        let font = self.font(font)?;
        let (ascent, descent) = vertical_metrics(&font, size);

        let mut width = 0.0;
        let mut prev: Option<char> = None;
        for ch in text.chars() {
            if let Some(left) = prev {
                width += font.horizontal_kern(left, ch, size).unwrap_or(0.0);
            }
            width += font.metrics(ch, size).advance_width;
            prev = Some(ch);
        }

        Ok(TextMetrics {
            width,
            ascent,
            descent,
        })
    }
}

impl TextRasterizer for FontdueBackend {
    fn rasterize(
        &self,
        text: &str,
        font: &str,
        size: f32,
    ) -> Result<Vec<GlyphBitmap>, LayoutError> {
        let font = self.font(font)?;
        let (baseline, _) = vertical_metrics(&font, size);

        let mut glyphs = Vec::new();
        let mut pen = 0.0f32;
        let mut prev: Option<char> = None;
        for ch in text.chars() {
            if let Some(left) = prev {
                pen += font.horizontal_kern(left, ch, size).unwrap_or(0.0);
            }
            let (metrics, coverage) = font.rasterize(ch, size);
            if metrics.width > 0 && metrics.height > 0 {
                glyphs.push(GlyphBitmap {
                    x: (pen + metrics.xmin as f32).round() as i32,
                    // ymin is the bitmap's bottom edge, measured upward from the baseline
                    y: (baseline - metrics.ymin as f32 - metrics.height as f32).round() as i32,
                    width: metrics.width,
                    height: metrics.height,
                    coverage,
                });
            }
            pen += metrics.advance_width;
            prev = Some(ch);
        }
        Ok(glyphs)
    }
}

#[cfg(test)]
mod tests {
    use super::FontdueBackend;
    use crate::layout::{FontMetricsProvider, LayoutError};

    #[test]
    fn missing_font_is_unavailable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = FontdueBackend::new(dir.path());
        assert!(matches!(
            backend.measure("hi", "NoSuchFont", 32.0),
            Err(LayoutError::FontUnavailable { .. })
        ));
    }

    #[test]
    fn unparseable_font_is_unavailable() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("Broken.ttf"), b"not a font").expect("write");
        let backend = FontdueBackend::new(dir.path());

        let err = backend.measure("hi", "Broken", 32.0).unwrap_err();
        match err {
            LayoutError::FontUnavailable { font, reason } => {
                assert_eq!(font, "Broken");
                assert!(reason.contains("Broken.ttf"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
