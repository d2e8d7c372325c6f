//! Scenes and the ordered utterances they expand into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::{Voice, VoiceConfig};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SceneType {
    Intro,
    Conversation,
    Ending,
}

impl SceneType {
    /// Order in which the encoder joins the per-type tracks.
    pub const TRACK_ORDER: [SceneType; 3] =
        [SceneType::Intro, SceneType::Conversation, SceneType::Ending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Conversation => "conversation",
            Self::Ending => "ending",
        }
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("Scene {id}: {scene_type} scene is missing {field}")]
    MissingField {
        id: String,
        scene_type: SceneType,
        field: &'static str,
    },
    #[error("Invalid speaker tag {0:?}")]
    InvalidSpeaker(String),
}

/// One scripted unit, already validated upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScene", into = "RawScene")]
pub enum Scene {
    Conversation {
        id: String,
        sequence: u32,
        native_text: String,
        learner_texts: Vec<String>,
    },
    /// Intro or ending narration
    Monologue {
        id: String,
        scene_type: SceneType,
        sequence: u32,
        text: String,
    },
}

impl Scene {
    pub fn conversation<S: Into<String>>(
        sequence: u32,
        native_text: impl Into<String>,
        learner_texts: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::Conversation {
            id: default_id(SceneType::Conversation, sequence),
            sequence,
            native_text: native_text.into(),
            learner_texts: learner_texts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn intro(sequence: u32, text: impl Into<String>) -> Self {
        Self::monologue(SceneType::Intro, sequence, text.into())
    }

    pub fn ending(sequence: u32, text: impl Into<String>) -> Self {
        Self::monologue(SceneType::Ending, sequence, text.into())
    }

    fn monologue(scene_type: SceneType, sequence: u32, text: String) -> Self {
        Self::Monologue {
            id: default_id(scene_type, sequence),
            scene_type,
            sequence,
            text,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Conversation { id, .. } | Self::Monologue { id, .. } => id,
        }
    }

    pub fn scene_type(&self) -> SceneType {
        match self {
            Self::Conversation { .. } => SceneType::Conversation,
            Self::Monologue { scene_type, .. } => *scene_type,
        }
    }

    pub fn sequence(&self) -> u32 {
        match self {
            Self::Conversation { sequence, .. } | Self::Monologue { sequence, .. } => *sequence,
        }
    }

    /// The native line, or the narration of a monologue.
    pub fn native_text(&self) -> &str {
        match self {
            Self::Conversation { native_text, .. } => native_text,
            Self::Monologue { text, .. } => text,
        }
    }

    /// Text spoken by learner `index`; the first learner text stands in for
    /// any learner without one of its own.
    pub fn learner_text(&self, index: usize) -> Option<&str> {
        match self {
            Self::Conversation { learner_texts, .. } => learner_texts
                .get(index)
                .or_else(|| learner_texts.first())
                .map(String::as_str),
            Self::Monologue { .. } => None,
        }
    }

    /// Every line of the scene joined by newlines.
    pub fn full_text(&self) -> String {
        match self {
            Self::Conversation {
                native_text,
                learner_texts,
                ..
            } => std::iter::once(native_text)
                .chain(learner_texts)
                .map(String::as_str)
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Monologue { text, .. } => text.clone(),
        }
    }

    /// Expand into speaking order: native first, then each configured
    /// learner voice by index. Monologues have a single native utterance.
    pub fn utterances<'a>(&'a self, voices: &'a VoiceConfig) -> Vec<Utterance<'a>> {
        let native = Utterance {
            tag: SpeakerTag::Native,
            text: self.native_text(),
            voice: &voices.native,
        };
        match self {
            Self::Conversation { .. } => std::iter::once(native)
                .chain(voices.learners.iter().enumerate().map(|(i, voice)| Utterance {
                    tag: SpeakerTag::Learner(i),
                    text: self.learner_text(i).unwrap_or(""),
                    voice,
                }))
                .collect(),
            Self::Monologue { .. } => vec![native],
        }
    }

    /// Mark-name prefix for one speaker, e.g. `conversation_01_learner1`.
    pub fn mark_prefix(&self, tag: SpeakerTag) -> String {
        format!("{}_{:02}_{tag}", self.scene_type(), self.sequence())
    }
}

fn default_id(scene_type: SceneType, sequence: u32) -> String {
    format!("{scene_type}_{sequence:02}")
}

/// Who speaks an utterance. Learner indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpeakerTag {
    Native,
    Learner(usize),
}

impl SpeakerTag {
    /// Frame screen the utterance is shown on.
    pub fn screen(&self) -> u32 {
        match self {
            Self::Native => 1,
            Self::Learner(_) => 2,
        }
    }
}

impl fmt::Display for SpeakerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Learner(i) => write!(f, "learner{}", i + 1),
        }
    }
}

impl FromStr for SpeakerTag {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "native" {
            return Ok(Self::Native);
        }
        s.strip_prefix("learner")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&n| n >= 1)
            .map(|n| Self::Learner(n - 1))
            .ok_or_else(|| SceneError::InvalidSpeaker(s.to_string()))
    }
}

impl Serialize for SpeakerTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpeakerTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One speaker's line within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utterance<'a> {
    pub tag: SpeakerTag,
    pub text: &'a str,
    pub voice: &'a Voice,
}

/// Wire form handed over by the scene parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScene {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    scene_type: SceneType,
    sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    native_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    learner_texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_text: Option<String>,
}

impl TryFrom<RawScene> for Scene {
    type Error = SceneError;

    fn try_from(raw: RawScene) -> Result<Self, Self::Error> {
        let id = if raw.id.is_empty() {
            default_id(raw.scene_type, raw.sequence)
        } else {
            raw.id
        };
        let missing = |field| SceneError::MissingField {
            id: id.clone(),
            scene_type: raw.scene_type,
            field,
        };

        match raw.scene_type {
            SceneType::Conversation => Ok(Self::Conversation {
                native_text: raw.native_text.ok_or_else(|| missing("nativeText"))?,
                id,
                sequence: raw.sequence,
                learner_texts: raw.learner_texts,
            }),
            scene_type => Ok(Self::Monologue {
                text: raw.full_text.ok_or_else(|| missing("fullText"))?,
                id,
                scene_type,
                sequence: raw.sequence,
            }),
        }
    }
}

impl From<Scene> for RawScene {
    fn from(scene: Scene) -> Self {
        match scene {
            Scene::Conversation {
                id,
                sequence,
                native_text,
                learner_texts,
            } => RawScene {
                id,
                scene_type: SceneType::Conversation,
                sequence,
                native_text: Some(native_text),
                learner_texts,
                full_text: None,
            },
            Scene::Monologue {
                id,
                scene_type,
                sequence,
                text,
            } => RawScene {
                id,
                scene_type,
                sequence,
                native_text: None,
                learner_texts: Vec::new(),
                full_text: Some(text),
            },
        }
    }
}
