//! Engine configuration.
//!
//! Every section has defaults, so a config file only needs the fields it
//! changes:
//!
//! ```json
//! {
//!   "timeline": { "silence_secs": 0.5 },
//!   "voices": {
//!     "native": { "name": "ko", "language": "ko-KR" },
//!     "learners": [{ "name": "cmn", "language": "cmn-CN" }]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::layout::Color;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Bounded retry policy for transient synthesis failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Silence inserted after every successful utterance
    pub silence_secs: f64,
    /// Punctuation → pause length in milliseconds
    pub pauses: BTreeMap<char, u32>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            silence_secs: 1.0,
            pauses: BTreeMap::from([
                (',', 300),
                (';', 400),
                (':', 400),
                ('.', 600),
                ('!', 600),
                ('?', 600),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Engine voice identifier
    pub name: String,
    /// Language tag used in the markup envelope
    pub language: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
        }
    }
}

/// The native voice and the learner voices, in speaking order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub native: Voice,
    pub learners: Vec<Voice>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            native: Voice::new("ko", "ko-KR"),
            learners: vec![Voice::new("cmn", "cmn-CN")],
        }
    }
}

/// Semi-transparent panel drawn behind a frame's text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxStyle {
    pub color: Color,
    pub alpha: f32,
    /// Padding around the union of line rectangles, in pixels
    pub margin: f32,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            alpha: 0.2,
            margin: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowStyle {
    pub dx: i32,
    pub dy: i32,
    pub color: Color,
    pub alpha: f32,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            dx: 3,
            dy: 3,
            color: Color::BLACK,
            alpha: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineStyle {
    /// Ring radius in pixels
    pub thickness: u32,
    pub color: Color,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self {
            thickness: 4,
            color: Color::BLACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct LayoutConfig {
    pub width: u32,
    pub height: u32,
    /// Canvas fill before anything is drawn
    pub background: Color,
    /// Line pitch as a multiple of ascent + descent
    pub line_spacing: f32,
    pub text_box: BoxStyle,
    pub shadow: ShadowStyle,
    pub outline: OutlineStyle,
    /// Directory font references are resolved against
    pub fonts_dir: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            background: Color::TRANSPARENT,
            line_spacing: 1.2,
            text_box: BoxStyle::default(),
            shadow: ShadowStyle::default(),
            outline: OutlineStyle::default(),
            fonts_dir: PathBuf::from("assets/fonts"),
        }
    }
}

/// Top-level configuration for one render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub timeline: TimelineConfig,
    pub voices: VoiceConfig,
    pub layout: LayoutConfig,
    /// Root of the `{project}/{identifier}/...` output tree
    pub output_root: PathBuf,
    /// Threads used for frame rendering
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            timeline: TimelineConfig::default(),
            voices: VoiceConfig::default(),
            layout: LayoutConfig::default(),
            output_root: PathBuf::from("output"),
            workers: 4,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
