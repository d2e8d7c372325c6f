//! # narration-sync
//!
//! Time-aligned narration audio and subtitle frames for multi-speaker
//! instructional video scenes.
//!
//! ## Features
//!
//! - **Speech markup**: per-word timing marks and punctuation-driven pauses
//! - **Resilient synthesis**: bounded retries plus a one-shot plain-text
//!   fallback when a voice rejects markup
//! - **Gap-aware timelines**: one running cursor per scene, with configurable
//!   silence between speakers
//! - **Subtitle frames**: word wrap, alignment, background box, shadow and
//!   outline compositing, written as PNG
//! - **Timing interchange**: JSON timing files an encoder can mux without any
//!   timing computation of its own
//!
//! Timing entries and rendered frames agree on filenames through a single
//! pure function, [`naming::frame_filename`].
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! narration-sync = "2026.2"
//! ```
//!
//! ```rust,no_run
//! use narration_sync::{config::EngineConfig, engines::espeak::EspeakEngine};
//! use narration_sync::layout::FontdueBackend;
//! use narration_sync::pipeline::{Pipeline, RenderJob};
//!
//! let config = EngineConfig::from_json_file("narration.json".as_ref())?;
//! let job = RenderJob::from_json_file("lesson.json".as_ref())?;
//! let backend = FontdueBackend::new(&config.layout.fonts_dir);
//! let mut pipeline = Pipeline::new(config, EspeakEngine::new(), backend);
//! let report = pipeline.run(&job)?;
//! println!("{} artifacts written", report.artifacts.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod engines;
pub mod export;
pub mod layout;
pub mod markup;
pub mod naming;
pub mod pipeline;
pub mod scene;
pub mod synthesis;
pub mod timeline;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use audio::AudioError;
pub use synthesis::SynthesisError;

/// A named point in synthesized audio reported by the engine for a `<mark>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timepoint {
    pub name: String,
    pub seconds: f64,
}

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples, the sample rate of the output audio and
/// any timing marks the engine reported.
#[derive(Debug, Clone, Default)]
pub struct SynthesisResult {
    /// Raw mono audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio
    pub sample_rate: u32,
    /// Mark timepoints, empty when the engine ran in plain-text mode
    pub marks: Vec<Timepoint>,
}

impl SynthesisResult {
    /// Decode an in-memory WAV file, downmixing to mono.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, AudioError> {
        let (samples, sample_rate) = audio::decode_wav(bytes)?;
        Ok(Self {
            samples,
            sample_rate,
            marks: Vec::new(),
        })
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), AudioError> {
        audio::write_wav(path, &self.samples, self.sample_rate)
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// What an engine is asked to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisInput<'a> {
    /// A speech markup document (see [`markup::build_markup`])
    Markup(&'a str),
    /// Plain text; no pauses, no marks
    PlainText(&'a str),
}

impl<'a> SynthesisInput<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Self::Markup(text) | Self::PlainText(text) => text,
        }
    }

    pub fn is_markup(&self) -> bool {
        matches!(self, Self::Markup(_))
    }
}

/// A single call to a synthesis engine.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub input: SynthesisInput<'a>,
    /// Engine-specific voice identifier
    pub voice: &'a str,
    /// BCP-47 style language tag, e.g. `ko-KR`
    pub language: &'a str,
}

/// Common interface for text-to-speech synthesis engines.
///
/// Engines classify their own failures into the [`SynthesisError`] taxonomy;
/// retry and fallback policy lives in [`synthesis::Orchestrator`], not here.
pub trait SynthesisEngine {
    /// Synthesize speech for one request.
    fn synthesize(&mut self, request: &SynthesisRequest<'_>)
        -> Result<SynthesisResult, SynthesisError>;
}

impl<E: SynthesisEngine + ?Sized> SynthesisEngine for &mut E {
    fn synthesize(
        &mut self,
        request: &SynthesisRequest<'_>,
    ) -> Result<SynthesisResult, SynthesisError> {
        (**self).synthesize(request)
    }
}
