//! Gap-aware timing for one scene, and track assembly across scenes.
//!
//! A scene's utterances are folded in speaking order through a [`Cursor`]
//! that owns the running time, the audio pieces and the entries produced so
//! far. A successful utterance occupies `[t, t + duration)` and is followed
//! by the configured silence; a failed one contributes nothing. Entries are
//! therefore ordered and non-overlapping by construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioError, AudioTrack};
use crate::config::{TimelineConfig, VoiceConfig};
use crate::markup::build_markup;
use crate::naming::frame_filename;
use crate::scene::{Scene, SceneType, SpeakerTag, Utterance};
use crate::synthesis::{Orchestrator, SynthesisError};
use crate::SynthesisEngine;

#[derive(thiserror::Error, Debug)]
pub enum TimelineError {
    #[error("Scene {scene_id} ({scene_type}): none of {attempted} segments succeeded")]
    NoSegments {
        scene_id: String,
        scene_type: SceneType,
        attempted: usize,
    },
    #[error("Cancelled during scene {scene_id}")]
    Cancelled { scene_id: String },
}

/// One row of the timing interchange file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub scene_id: String,
    pub speaker: SpeakerTag,
    pub text: String,
    pub image_filename: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

impl TimingEntry {
    fn shifted(mut self, offset: f64) -> Self {
        self.start_time = round_millis(self.start_time + offset);
        self.end_time = round_millis(self.end_time + offset);
        self
    }
}

/// Round to 3 decimal places.
pub fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

/// An utterance that was skipped after synthesis failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUtterance {
    pub speaker: SpeakerTag,
    pub error: SynthesisError,
}

/// Entries and audio for one scene, timed from zero.
#[derive(Debug, Clone)]
pub struct SceneTimeline {
    pub scene_id: String,
    pub scene_type: SceneType,
    pub sequence: u32,
    pub entries: Vec<TimingEntry>,
    pub audio: AudioTrack,
    /// Length including the trailing silence
    pub duration_secs: f64,
    /// Utterances with text that were sent for synthesis
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: Vec<SkippedUtterance>,
}

#[derive(Debug, Default)]
struct Cursor {
    t: f64,
    entries: Vec<TimingEntry>,
    audio: AudioTrack,
    attempted: usize,
    skipped: Vec<SkippedUtterance>,
}

/// Builds scene timelines for one identifier.
pub struct TimelineBuilder<'a> {
    identifier: &'a str,
    config: &'a TimelineConfig,
    voices: &'a VoiceConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(identifier: &'a str, config: &'a TimelineConfig, voices: &'a VoiceConfig) -> Self {
        Self {
            identifier,
            config,
            voices,
            cancel: None,
        }
    }

    /// Stop between utterances once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Synthesize every utterance of `scene` in order and time it.
    ///
    /// Fails with [`TimelineError::NoSegments`] when nothing was spoken; no
    /// audio should be written for such a scene.
    pub fn build_scene<E: SynthesisEngine>(
        &self,
        orchestrator: &mut Orchestrator<E>,
        scene: &Scene,
    ) -> Result<SceneTimeline, TimelineError> {
        let utterances = scene.utterances(self.voices);
        let cursor = utterances
            .iter()
            .try_fold(Cursor::default(), |cursor, utterance| {
                if self.is_cancelled() {
                    return Err(TimelineError::Cancelled {
                        scene_id: scene.id().to_string(),
                    });
                }
                self.step(orchestrator, scene, utterance, cursor)
            })?;

        let succeeded = cursor.entries.len();
        if succeeded == 0 {
            log::error!(
                "Scene {} ({}): no segments succeeded, skipping its audio",
                scene.id(),
                scene.scene_type()
            );
            return Err(TimelineError::NoSegments {
                scene_id: scene.id().to_string(),
                scene_type: scene.scene_type(),
                attempted: cursor.attempted,
            });
        }
        if succeeded < cursor.attempted {
            log::warn!(
                "Scene {} ({}): {succeeded} of {} segments succeeded",
                scene.id(),
                scene.scene_type(),
                cursor.attempted
            );
        }

        Ok(SceneTimeline {
            scene_id: scene.id().to_string(),
            scene_type: scene.scene_type(),
            sequence: scene.sequence(),
            entries: cursor.entries,
            audio: cursor.audio,
            duration_secs: cursor.t,
            attempted: cursor.attempted,
            succeeded,
            skipped: cursor.skipped,
        })
    }

    fn step<E: SynthesisEngine>(
        &self,
        orchestrator: &mut Orchestrator<E>,
        scene: &Scene,
        utterance: &Utterance<'_>,
        mut cursor: Cursor,
    ) -> Result<Cursor, TimelineError> {
        let voice = utterance.voice;
        let markup = build_markup(
            utterance.text,
            &voice.language,
            &scene.mark_prefix(utterance.tag),
            &self.config.pauses,
        );
        if markup.is_empty() {
            log::debug!("Scene {}: no text for {}", scene.id(), utterance.tag);
            return Ok(cursor);
        }
        cursor.attempted += 1;

        let segment = match orchestrator.synthesize(&markup, &voice.name, &voice.language) {
            Ok(segment) => segment,
            Err(error) => {
                log::warn!(
                    "Scene {}: skipping {} utterance: {error}",
                    scene.id(),
                    utterance.tag
                );
                cursor.skipped.push(SkippedUtterance {
                    speaker: utterance.tag,
                    error,
                });
                return Ok(cursor);
            }
        };

        if let Err(err) = cursor.audio.push_segment(&segment.audio) {
            log::warn!(
                "Scene {}: skipping {} utterance, its audio could not be joined: {err}",
                scene.id(),
                utterance.tag
            );
            cursor.skipped.push(SkippedUtterance {
                speaker: utterance.tag,
                error: SynthesisError::Fatal(err.to_string()),
            });
            return Ok(cursor);
        }
        let start = cursor.t;
        let end = start + segment.duration_secs;
        cursor.entries.push(TimingEntry {
            scene_id: scene.id().to_string(),
            speaker: utterance.tag,
            text: utterance.text.trim().to_string(),
            image_filename: frame_filename(
                self.identifier,
                scene.scene_type(),
                scene.sequence(),
                utterance.tag.screen(),
            ),
            start_time: round_millis(start),
            end_time: round_millis(end),
            duration: round_millis(segment.duration_secs),
        });

        let silence = self.config.silence_secs.max(0.0);
        cursor.audio.push_silence(silence);
        cursor.t = end + silence;
        Ok(cursor)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Scenes of one type joined into a single timeline and audio track.
#[derive(Debug, Clone)]
pub struct Track {
    pub scene_type: SceneType,
    pub entries: Vec<TimingEntry>,
    pub audio: AudioTrack,
    pub duration_secs: f64,
}

impl Track {
    pub fn new(scene_type: SceneType) -> Self {
        Self {
            scene_type,
            entries: Vec::new(),
            audio: AudioTrack::new(),
            duration_secs: 0.0,
        }
    }

    /// Append a scene, shifting its entries past everything already here.
    pub fn push_scene(&mut self, scene: SceneTimeline) -> Result<(), AudioError> {
        self.audio.append(scene.audio)?;
        let offset = self.duration_secs;
        self.entries
            .extend(scene.entries.into_iter().map(|entry| entry.shifted(offset)));
        self.duration_secs += scene.duration_secs;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{TimelineBuilder, TimelineError, Track};
    use crate::config::{RetryConfig, TimelineConfig, Voice, VoiceConfig};
    use crate::scene::{Scene, SceneType, SpeakerTag};
    use crate::synthesis::{Orchestrator, SynthesisError};
    use crate::testing::{tone, ScriptedEngine};
    use crate::SynthesisResult;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn timeline_config(silence_secs: f64) -> TimelineConfig {
        TimelineConfig {
            silence_secs,
            pauses: BTreeMap::from([(',', 300), ('.', 600)]),
        }
    }

    fn voices(learners: &[&str]) -> VoiceConfig {
        VoiceConfig {
            native: Voice::new("ko", "ko-KR"),
            learners: learners.iter().map(|name| Voice::new(*name, "cmn-CN")).collect(),
        }
    }

    fn no_wait() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            retry_delay_ms: 0,
        }
    }

    #[test]
    fn learner_starts_after_native_plus_silence() {
        let config = timeline_config(1.0);
        let voices = voices(&["cmn"]);
        let mut engine = ScriptedEngine::new()
            .then("ko", Ok(tone(0.8)))
            .then("cmn", Ok(tone(0.9)));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("lesson", &config, &voices);

        let scene = Scene::conversation(1, "Hi", ["Hola"]);
        let timeline = builder.build_scene(&mut orchestrator, &scene).expect("timeline");

        let native = &timeline.entries[0];
        assert_eq!(native.speaker, SpeakerTag::Native);
        assert_eq!((native.start_time, native.end_time), (0.0, 0.8));
        assert_eq!(native.image_filename, "lesson_conversation_001_1.png");

        let learner = &timeline.entries[1];
        assert_eq!(learner.speaker, SpeakerTag::Learner(0));
        assert_eq!((learner.start_time, learner.end_time), (1.8, 2.7));
        assert_eq!(learner.duration, 0.9);
        assert_eq!(learner.image_filename, "lesson_conversation_001_2.png");

        // Silence follows the last learner as well
        assert!((timeline.duration_secs - 3.7).abs() < 1e-9);
        let audio = timeline.audio.finish().expect("audio");
        assert!((audio.duration_secs() - 3.7).abs() < 1e-9);
    }

    #[test]
    fn voices_at_different_rates_share_one_scene() {
        let config = timeline_config(1.0);
        let voices = voices(&["cmn"]);
        let learner = SynthesisResult {
            samples: vec![0.1; 21600],
            sample_rate: 24000,
            marks: Vec::new(),
        };
        let mut engine = ScriptedEngine::new()
            .then("ko", Ok(tone(0.8)))
            .then("cmn", Ok(learner));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("lesson", &config, &voices);

        let timeline = builder
            .build_scene(&mut orchestrator, &Scene::conversation(1, "Hi", ["Hola"]))
            .expect("timeline");

        assert_eq!(timeline.succeeded, 2);
        assert!(timeline.skipped.is_empty());
        assert_eq!(
            (timeline.entries[1].start_time, timeline.entries[1].end_time),
            (1.8, 2.7)
        );
        let audio = timeline.audio.finish().expect("audio");
        assert_eq!(audio.sample_rate, 16000);
        assert!((audio.duration_secs() - 3.7).abs() < 1e-9);
    }

    #[test]
    fn scenes_at_different_rates_share_one_track() {
        let config = timeline_config(0.5);
        let voices = voices(&[]);
        let fast = SynthesisResult {
            samples: vec![0.1; 12000],
            sample_rate: 24000,
            marks: Vec::new(),
        };
        let mut engine = ScriptedEngine::new()
            .then("ko", Ok(tone(1.0)))
            .then("ko", Ok(fast));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("id", &config, &voices);

        let mut track = Track::new(SceneType::Ending);
        for sequence in 1..=2 {
            let scene = builder
                .build_scene(&mut orchestrator, &Scene::ending(sequence, "Bye"))
                .expect("timeline");
            track.push_scene(scene).expect("push");
        }

        assert_eq!(track.entries[1].start_time, 1.5);
        let audio = track.audio.finish().expect("audio");
        assert_eq!(audio.sample_rate, 16000);
        assert!((audio.duration_secs() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn markup_carries_the_speaker_prefix() {
        let config = timeline_config(0.5);
        let voices = voices(&["cmn"]);
        let mut engine = ScriptedEngine::new()
            .always("ko", Ok(tone(0.5)))
            .always("cmn", Ok(tone(0.5)));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("id", &config, &voices);

        builder
            .build_scene(&mut orchestrator, &Scene::conversation(3, "하나, 둘.", ["一"]))
            .expect("timeline");
        drop(orchestrator);

        assert!(engine.calls[0].text.contains("conversation_03_native_0"));
        assert!(engine.calls[0].text.contains("<break time=\"300ms\"/>"));
        assert!(engine.calls[1].text.contains("conversation_03_learner1_0"));
    }

    #[test]
    fn every_failure_fails_the_scene() {
        let config = timeline_config(1.0);
        let voices = voices(&["cmn", "yue"]);
        let transient = Err(SynthesisError::Transient("timeout".to_string()));
        let mut engine = ScriptedEngine::new()
            .always("ko", transient.clone())
            .always("cmn", transient.clone())
            .always("yue", transient);
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("id", &config, &voices);

        let err = builder
            .build_scene(&mut orchestrator, &Scene::conversation(1, "a", ["b", "c"]))
            .unwrap_err();
        match err {
            TimelineError::NoSegments {
                scene_id,
                scene_type,
                attempted,
            } => {
                assert_eq!(scene_id, "conversation_01");
                assert_eq!(scene_type, SceneType::Conversation);
                assert_eq!(attempted, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(orchestrator.stats().failed, 3);
    }

    #[test]
    fn failed_utterance_contributes_no_time() {
        let config = timeline_config(1.0);
        let voices = voices(&["cmn", "yue"]);
        let mut engine = ScriptedEngine::new()
            .then("ko", Ok(tone(0.5)))
            .then("cmn", Err(SynthesisError::Fatal("bad voice".to_string())))
            .then("yue", Ok(tone(0.25)));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("id", &config, &voices);

        let timeline = builder
            .build_scene(&mut orchestrator, &Scene::conversation(1, "a", ["b", "c"]))
            .expect("partial timeline");

        assert_eq!(timeline.attempted, 3);
        assert_eq!(timeline.succeeded, 2);
        assert_eq!(timeline.skipped.len(), 1);
        assert_eq!(timeline.skipped[0].speaker, SpeakerTag::Learner(0));
        assert_eq!(timeline.entries[1].speaker, SpeakerTag::Learner(1));
        assert_eq!(timeline.entries[1].start_time, 1.5);
    }

    #[test]
    fn blank_text_is_skipped_without_a_call() {
        let config = timeline_config(1.0);
        let voices = voices(&["cmn"]);
        let mut engine = ScriptedEngine::new().always("ko", Ok(tone(0.5)));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("id", &config, &voices);

        let timeline = builder
            .build_scene(&mut orchestrator, &Scene::conversation(1, "a", ["  "]))
            .expect("timeline");
        drop(orchestrator);

        assert_eq!(timeline.attempted, 1);
        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(engine.calls_for("cmn"), 0);
    }

    #[test]
    fn entries_never_overlap() {
        let config = timeline_config(0.35);
        let voices = voices(&["l1", "l2", "l3"]);
        let mut engine = ScriptedEngine::new()
            .then("ko", Ok(tone(0.333)))
            .then("ko", Ok(tone(1.2345)))
            .then("l1", Ok(tone(0.1116)))
            .then("l1", Err(SynthesisError::Fatal("x".to_string())))
            .then("l2", Err(SynthesisError::Fatal("x".to_string())))
            .then("l2", Ok(tone(2.0004)))
            .always("l3", Ok(tone(0.0667)));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("id", &config, &voices);

        for sequence in 1..=2 {
            let scene = Scene::conversation(sequence, "a b", ["c", "d", "e"]);
            let timeline = builder.build_scene(&mut orchestrator, &scene).expect("timeline");
            for pair in timeline.entries.windows(2) {
                assert!(pair[0].start_time <= pair[0].end_time);
                assert!(
                    pair[0].end_time <= pair[1].start_time,
                    "{:?} overlaps {:?}",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn cancellation_stops_between_utterances() {
        let config = timeline_config(1.0);
        let voices = voices(&["cmn"]);
        let mut engine = ScriptedEngine::new().always("ko", Ok(tone(0.5)));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let flag = Arc::new(AtomicBool::new(true));
        let builder = TimelineBuilder::new("id", &config, &voices).with_cancel(flag);

        let err = builder
            .build_scene(&mut orchestrator, &Scene::intro(1, "Welcome"))
            .unwrap_err();
        assert!(matches!(err, TimelineError::Cancelled { .. }));
        assert_eq!(orchestrator.stats().attempted, 0);
    }

    #[test]
    fn track_offsets_later_scenes() {
        let config = timeline_config(1.0);
        let voices = voices(&[]);
        let mut engine = ScriptedEngine::new()
            .then("ko", Ok(tone(0.5)))
            .then("ko", Ok(tone(0.75)));
        let mut orchestrator = Orchestrator::new(&mut engine, no_wait());
        let builder = TimelineBuilder::new("id", &config, &voices);

        let mut track = Track::new(SceneType::Intro);
        for (sequence, text) in [(1, "first"), (2, "second")] {
            let scene = builder
                .build_scene(&mut orchestrator, &Scene::intro(sequence, text))
                .expect("timeline");
            track.push_scene(scene).expect("push");
        }

        assert_eq!(track.entries.len(), 2);
        assert_eq!(track.entries[1].start_time, 1.5);
        assert_eq!(track.entries[1].end_time, 2.25);
        assert_eq!(track.entries[1].image_filename, "id_intro_002_1.png");
        assert!((track.duration_secs - 3.25).abs() < 1e-9);
        let audio = track.audio.finish().expect("audio");
        assert!((audio.duration_secs() - 3.25).abs() < 1e-9);
    }
}
