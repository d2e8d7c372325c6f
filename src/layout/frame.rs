use std::path::{Path, PathBuf};

use super::canvas::Canvas;
use super::metrics::{FontMetricsProvider, TextRasterizer};
use super::style::{FontWeight, HAlign, StyleDescriptor, VAlign};
use super::{LayoutError, Rect};
use crate::config::LayoutConfig;
use crate::naming::FrameKey;

/// One text field destined for a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameField {
    pub text: String,
    pub style: StyleDescriptor,
}

impl FrameField {
    pub fn new(text: impl Into<String>, style: StyleDescriptor) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// A wrapped line with its top-left corner in canvas pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    /// Ascent plus descent, without line spacing
    pub height: f32,
}

impl PositionedLine {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub lines: Vec<PositionedLine>,
    pub block_height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameLayout {
    pub fields: Vec<FieldLayout>,
    /// Background panel, present when any field asked for one
    pub background: Option<Rect>,
}

impl FrameLayout {
    /// Every non-empty line of every field, in draw order.
    pub fn lines(&self) -> impl Iterator<Item = &PositionedLine> {
        self.fields
            .iter()
            .flat_map(|f| f.lines.iter())
            .filter(|line| !line.text.is_empty())
    }
}

/// Lays out and renders frames against one canvas configuration.
pub struct LayoutEngine<'a, R: ?Sized> {
    config: &'a LayoutConfig,
    backend: &'a R,
}

impl<'a, R: FontMetricsProvider + ?Sized> LayoutEngine<'a, R> {
    pub fn new(config: &'a LayoutConfig, backend: &'a R) -> Self {
        Self { config, backend }
    }

    /// Greedy word wrap. Explicit newlines always break; a word wider than
    /// `max_width` on its own still gets its own line.
    pub fn wrap(&self, text: &str, style: &StyleDescriptor) -> Result<Vec<String>, LayoutError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut lines = Vec::new();
        for paragraph in text.lines() {
            let mut current = String::new();
            for word in paragraph.split_whitespace() {
                if current.is_empty() {
                    current.push_str(word);
                    continue;
                }
                let candidate = format!("{current} {word}");
                let fits = style.max_width <= 0.0
                    || self.backend.measure(&candidate, &style.font, style.size)?.width
                        <= style.max_width;
                if fits {
                    current = candidate;
                } else {
                    lines.push(std::mem::replace(&mut current, word.to_string()));
                }
            }
            lines.push(current);
        }
        Ok(lines)
    }

    pub fn layout_field(&self, field: &FrameField) -> Result<FieldLayout, LayoutError> {
        let style = &field.style;
        let font = self.backend.measure("", &style.font, style.size)?;
        let line_height = font.line_height();
        let pitch = line_height * self.config.line_spacing;

        let wrapped = self.wrap(&field.text, style)?;
        let block_height = wrapped.len() as f32 * pitch;
        let origin_y = match style.v_align {
            VAlign::Top => style.y,
            VAlign::Center => style.y - block_height / 2.0,
            VAlign::Bottom => style.y - block_height,
        };

        let mut lines = Vec::with_capacity(wrapped.len());
        for (i, text) in wrapped.into_iter().enumerate() {
            let width = self.backend.measure(&text, &style.font, style.size)?.width;
            if style.max_width > 0.0 && width > style.max_width {
                log::debug!(
                    "Layout overflow: {text:?} is {width:.1}px wide, limit {:.1}px",
                    style.max_width
                );
            }
            lines.push(PositionedLine {
                x: align_x(style, width),
                y: origin_y + i as f32 * pitch,
                text,
                width,
                height: line_height,
            });
        }

        Ok(FieldLayout {
            lines,
            block_height,
        })
    }

    pub fn layout(&self, fields: &[FrameField]) -> Result<FrameLayout, LayoutError> {
        let fields_layout = fields
            .iter()
            .map(|field| self.layout_field(field))
            .collect::<Result<Vec<_>, _>>()?;
        let mut layout = FrameLayout {
            fields: fields_layout,
            background: None,
        };

        // The panel covers every line in the frame, flagged field or not.
        if fields.iter().any(|f| f.style.background) {
            layout.background = layout
                .lines()
                .map(PositionedLine::rect)
                .reduce(Rect::union)
                .map(|rect| rect.expand(self.config.text_box.margin));
        }
        Ok(layout)
    }
}

impl<'a, R: TextRasterizer + ?Sized> LayoutEngine<'a, R> {
    pub fn render(&self, fields: &[FrameField]) -> Result<Canvas, LayoutError> {
        let layout = self.layout(fields)?;
        let config = self.config;
        let mut canvas = Canvas::new(config.width, config.height, config.background);

        if let Some(rect) = layout.background {
            canvas.fill_rect(rect, config.text_box.color.with_alpha(config.text_box.alpha));
        }

        let ring = outline_offsets(config.outline.thickness);
        for (field, placed) in fields.iter().zip(&layout.fields) {
            let style = &field.style;
            for line in placed.lines.iter().filter(|l| !l.text.is_empty()) {
                let glyphs = self.backend.rasterize(&line.text, &style.font, style.size)?;
                let x = line.x.round() as i32;
                let y = line.y.round() as i32;

                if style.shadow {
                    let shadow = &config.shadow;
                    canvas.draw_glyphs(
                        &glyphs,
                        x + shadow.dx,
                        y + shadow.dy,
                        shadow.color.with_alpha(shadow.alpha),
                    );
                }
                if style.outline {
                    for &(dx, dy) in &ring {
                        canvas.draw_glyphs(&glyphs, x + dx, y + dy, config.outline.color);
                    }
                }
                canvas.draw_glyphs(&glyphs, x, y, style.color);
                if style.weight == FontWeight::Bold {
                    canvas.draw_glyphs(&glyphs, x + 1, y, style.color);
                }
            }
        }
        Ok(canvas)
    }

    /// Render and write `{dir}/{frame filename}`, returning the written path.
    pub fn render_to_file(
        &self,
        key: &FrameKey<'_>,
        fields: &[FrameField],
        dir: &Path,
    ) -> Result<PathBuf, LayoutError> {
        let canvas = self.render(fields)?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(key.filename());
        canvas.write_png(&path)?;
        log::info!("Wrote frame {}", path.display());
        Ok(path)
    }
}

fn align_x(style: &StyleDescriptor, width: f32) -> f32 {
    if style.max_width <= 0.0 {
        return match style.h_align {
            HAlign::Left => style.x,
            HAlign::Center => style.x - width / 2.0,
            HAlign::Right => style.x - width,
        };
    }
    match style.h_align {
        HAlign::Left => style.x,
        HAlign::Center => style.x + (style.max_width - width) / 2.0,
        HAlign::Right => style.x + style.max_width - width,
    }
}

/// Pixel offsets within `thickness` of the origin, excluding the origin.
fn outline_offsets(thickness: u32) -> Vec<(i32, i32)> {
    let t = thickness as i32;
    let mut offsets = Vec::new();
    for dy in -t..=t {
        for dx in -t..=t {
            if (dx, dy) != (0, 0) && dx * dx + dy * dy <= t * t {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}
