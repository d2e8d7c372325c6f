use std::path::Path;

use super::metrics::GlyphBitmap;
use super::style::Color;
use super::{LayoutError, Rect};

/// An RGBA8 raster with source-over compositing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width as usize * height as usize {
            pixels.extend_from_slice(&[fill.r, fill.g, fill.b, fill.a]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// RGBA at (x, y); `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.index(x, y);
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[idx..idx + 4]);
        Some(px)
    }

    /// Composite `color` over every pixel the rectangle touches, clipped to
    /// the canvas.
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let x0 = rect.x0.floor().max(0.0) as u32;
        let y0 = rect.y0.floor().max(0.0) as u32;
        let x1 = (rect.x1.ceil().max(0.0) as u32).min(self.width);
        let y1 = (rect.y1.ceil().max(0.0) as u32).min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let idx = self.index(x, y);
                blend_pixel(&mut self.pixels[idx..idx + 4], color);
            }
        }
    }

    /// Stamp glyph coverage in `color`, offsetting every glyph by (x, y).
    pub fn draw_glyphs(&mut self, glyphs: &[GlyphBitmap], x: i32, y: i32, color: Color) {
        for glyph in glyphs {
            self.blend_glyph(glyph, x + glyph.x, y + glyph.y, color);
        }
    }

    fn blend_glyph(&mut self, glyph: &GlyphBitmap, x: i32, y: i32, color: Color) {
        for row in 0..glyph.height {
            let py = y + row as i32;
            if py < 0 || py >= self.height as i32 {
                continue;
            }
            for col in 0..glyph.width {
                let px = x + col as i32;
                if px < 0 || px >= self.width as i32 {
                    continue;
                }
                let mask = glyph.coverage[row * glyph.width + col];
                if mask == 0 {
                    continue;
                }
                let alpha = ((u16::from(mask) * u16::from(color.a)) / 255) as u8;
                let idx = self.index(px as u32, py as u32);
                blend_pixel(&mut self.pixels[idx..idx + 4], Color { a: alpha, ..color });
            }
        }
    }

    /// Encode as an 8-bit RGBA PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, LayoutError> {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&self.pixels)?;
            writer.finish()?;
        }
        Ok(bytes)
    }

    pub fn write_png(&self, path: &Path) -> Result<(), LayoutError> {
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

/// Source-over for straight alpha, in integer arithmetic.
fn blend_pixel(dst: &mut [u8], src: Color) {
    let sa = u32::from(src.a);
    if sa == 0 {
        return;
    }
    let da = u32::from(dst[3]);
    let inv = 255 - sa;
    // Output alpha scaled by 255
    let out_a = sa * 255 + da * inv;
    if out_a == 0 {
        return;
    }
    let src_rgb = [src.r, src.g, src.b];
    for (channel, &s) in dst.iter_mut().take(3).zip(src_rgb.iter()) {
        let value = u32::from(s) * sa * 255 + u32::from(*channel) * da * inv;
        *channel = ((value + out_a / 2) / out_a) as u8;
    }
    dst[3] = ((out_a + 127) / 255) as u8;
}

#[cfg(test)]
mod tests {
    use super::Canvas;
    use crate::layout::{Color, GlyphBitmap, Rect};

    #[test]
    fn opaque_fill_replaces_pixels() {
        let mut canvas = Canvas::new(4, 4, Color::TRANSPARENT);
        canvas.fill_rect(Rect::new(1.0, 1.0, 3.0, 3.0), Color::rgb(255, 0, 0));
        assert_eq!(canvas.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(canvas.pixel(3, 3), Some([0, 0, 0, 0]));
    }

    #[test]
    fn translucent_fill_over_transparent_keeps_source_colour() {
        let mut canvas = Canvas::new(1, 1, Color::TRANSPARENT);
        canvas.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::BLACK.with_alpha(0.2));
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 51]));
    }

    #[test]
    fn half_alpha_over_opaque_mixes() {
        let mut canvas = Canvas::new(1, 1, Color::WHITE);
        canvas.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::rgba(0, 0, 0, 128));
        let [r, g, b, a] = canvas.pixel(0, 0).expect("pixel");
        assert_eq!(a, 255);
        assert_eq!((r, g, b), (127, 127, 127));
    }

    #[test]
    fn glyphs_are_clipped_at_the_edges() {
        let mut canvas = Canvas::new(2, 2, Color::TRANSPARENT);
        let glyph = GlyphBitmap {
            x: 0,
            y: 0,
            width: 3,
            height: 3,
            coverage: vec![255; 9],
        };
        canvas.draw_glyphs(&[glyph], -1, -1, Color::WHITE);
        assert_eq!(canvas.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(1, 1), Some([255, 255, 255, 255]));
    }

    #[test]
    fn encodes_a_png_signature() {
        let canvas = Canvas::new(3, 2, Color::BLACK);
        let bytes = canvas.encode_png().expect("encode");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
