//! Subtitle frame layout and rendering.
//!
//! A frame is an ordered list of text fields, each with a resolved
//! [`StyleDescriptor`]. Rendering a frame:
//!
//! 1. wraps every field greedily against its `max_width`
//! 2. places the wrapped block by vertical alignment and each line by
//!    horizontal alignment
//! 3. if any field asks for a background box, fills the union of *all*
//!    positioned lines in the frame, grown by the configured margin
//! 4. draws each line back to front: shadow, outline ring, main text
//!
//! Font access goes through [`FontMetricsProvider`] / [`TextRasterizer`];
//! [`FontdueBackend`] reads real font files and [`MonospaceMetrics`] gives
//! exact, font-free metrics.

mod canvas;
mod font;
mod frame;
mod metrics;
mod style;

pub use canvas::Canvas;
pub use font::FontdueBackend;
pub use frame::{FieldLayout, FrameField, FrameLayout, LayoutEngine, PositionedLine};
pub use metrics::{FontMetricsProvider, GlyphBitmap, MonospaceMetrics, TextMetrics, TextRasterizer};
pub use style::{Color, FontWeight, HAlign, StyleDescriptor, VAlign};

#[derive(thiserror::Error, Debug)]
pub enum LayoutError {
    #[error("Font {font} unavailable: {reason}")]
    FontUnavailable { font: String, reason: String },
    #[error("Invalid colour {0:?}, expected #RRGGBB or #RRGGBBAA")]
    InvalidColor(String),
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Axis-aligned rectangle in canvas pixels, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn union(self, other: Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn expand(self, margin: f32) -> Rect {
        Rect {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }
}
