//! Frame and artifact naming.
//!
//! [`frame_filename`] is the only place a frame name is formed. The timeline
//! calls it to predict the image an entry shows and the layout engine calls
//! it to name what it writes, so neither side needs the other's state.

use std::path::{Path, PathBuf};

use crate::scene::SceneType;

pub const FRAME_EXTENSION: &str = "png";

const MAX_COMPONENT_CHARS: usize = 100;

/// `{identifier}_{sceneType}_{sequence:03}_{screen}.png`
pub fn frame_filename(identifier: &str, scene_type: SceneType, sequence: u32, screen: u32) -> String {
    format!("{identifier}_{scene_type}_{sequence:03}_{screen}.{FRAME_EXTENSION}")
}

/// The inputs that identify one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey<'a> {
    pub identifier: &'a str,
    pub scene_type: SceneType,
    pub sequence: u32,
    pub screen: u32,
}

impl FrameKey<'_> {
    pub fn filename(&self) -> String {
        frame_filename(self.identifier, self.scene_type, self.sequence, self.screen)
    }
}

/// Make a user-supplied name safe as a single path component.
///
/// Anything but word characters and `-` becomes `_`, runs of `_` collapse,
/// and the result is trimmed and capped at 100 characters. An input with
/// nothing usable left becomes `untitled`.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = if ch.is_alphanumeric() || ch == '-' { ch } else { '_' };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }

    let trimmed = out.trim_matches('_');
    let capped: String = trimmed.chars().take(MAX_COMPONENT_CHARS).collect();
    let capped = capped.trim_end_matches('_');
    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped.to_string()
    }
}

/// Output tree for one render pass:
///
/// ```text
/// {output_root}/{project}/{identifier}/
/// ├── timing/{identifier}_{sceneType}.json
/// ├── audio/{identifier}_{sceneType}.wav
/// └── {sceneType}/{frame files}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    identifier: String,
}

impl OutputLayout {
    /// Both `project` and `identifier` are sanitized.
    pub fn new(output_root: &Path, project: &str, identifier: &str) -> Self {
        let identifier = sanitize_component(identifier);
        let root = output_root
            .join(sanitize_component(project))
            .join(&identifier);
        Self { root, identifier }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The sanitized identifier used in every file name.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn timing_file(&self, scene_type: SceneType) -> PathBuf {
        self.root
            .join("timing")
            .join(format!("{}_{scene_type}.json", self.identifier))
    }

    pub fn audio_file(&self, scene_type: SceneType) -> PathBuf {
        self.root
            .join("audio")
            .join(format!("{}_{scene_type}.wav", self.identifier))
    }

    pub fn frames_dir(&self, scene_type: SceneType) -> PathBuf {
        self.root.join(scene_type.as_str())
    }
}
