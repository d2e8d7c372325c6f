//! Retry and fallback policy around a single synthesis call.
//!
//! Transition table:
//!
//! | state      | engine result       | next                                   |
//! |------------|---------------------|----------------------------------------|
//! | `Attempt`  | audio, duration > 0 | `Done`                                 |
//! | `Attempt`  | `MarkupUnsupported` | `Fallback`                             |
//! | `Attempt`  | `Transient`         | `Attempt(n + 1)` while `n < max`, else `Failed(Fatal)` |
//! | `Attempt`  | `Fatal`             | `Failed(Fatal)`                        |
//! | `Fallback` | audio, duration > 0 | `Done`                                 |
//! | `Fallback` | any error           | `Failed(Fatal)`                        |
//!
//! A zero-length result counts as `Transient`.

use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::config::RetryConfig;
use crate::markup::strip_markup;
use crate::{SynthesisEngine, SynthesisInput, SynthesisRequest, SynthesisResult};

/// Failure taxonomy shared by engines and the orchestrator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Voice does not support speech markup: {0}")]
    MarkupUnsupported(String),
    #[error("Transient synthesis failure: {0}")]
    Transient(String),
    #[error("Synthesis failed: {0}")]
    Fatal(String),
}

const TRANSIENT_HINTS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "unavailable",
    "temporarily",
    "rate limit",
    "too many requests",
    "connection reset",
    "429",
    "503",
];

impl SynthesisError {
    /// Classify a raw engine error message.
    ///
    /// Any mention of SSML is taken as the voice rejecting markup.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("ssml") {
            Self::MarkupUnsupported(message)
        } else if TRANSIENT_HINTS.iter().any(|hint| lower.contains(hint)) {
            Self::Transient(message)
        } else {
            Self::Fatal(message)
        }
    }
}

/// One synthesized utterance and its measured duration.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub audio: SynthesisResult,
    pub duration_secs: f64,
    /// True when the voice rejected markup and plain text was spoken instead
    pub fell_back: bool,
}

/// Call accounting. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallStats {
    pub attempted: u32,
    pub succeeded: u32,
    pub retried: u32,
    pub fell_back: u32,
    pub failed: u32,
}

impl CallStats {
    pub fn merge(&mut self, other: &CallStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.fell_back += other.fell_back;
        self.failed += other.failed;
    }
}

#[derive(Debug)]
enum State {
    Attempt { retries: u32 },
    Fallback,
    Done(AudioSegment),
    Failed(SynthesisError),
}

/// Drives one engine with bounded retries and a plain-text fallback.
pub struct Orchestrator<E> {
    engine: E,
    policy: RetryConfig,
    stats: CallStats,
}

impl<E: SynthesisEngine> Orchestrator<E> {
    pub fn new(engine: E, policy: RetryConfig) -> Self {
        Self {
            engine,
            policy,
            stats: CallStats::default(),
        }
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    /// Synthesize `markup`, returning the segment or a `Fatal` error.
    pub fn synthesize(
        &mut self,
        markup: &str,
        voice: &str,
        language: &str,
    ) -> Result<AudioSegment, SynthesisError> {
        self.stats.attempted += 1;
        let mut state = State::Attempt { retries: 0 };
        loop {
            state = match state {
                State::Attempt { retries } => self.attempt(markup, voice, language, retries),
                State::Fallback => self.fallback(markup, voice, language),
                State::Done(segment) => {
                    self.stats.succeeded += 1;
                    return Ok(segment);
                }
                State::Failed(err) => {
                    self.stats.failed += 1;
                    return Err(err);
                }
            };
        }
    }

    fn attempt(&mut self, markup: &str, voice: &str, language: &str, retries: u32) -> State {
        let request = SynthesisRequest {
            input: SynthesisInput::Markup(markup),
            voice,
            language,
        };
        match self.call(&request) {
            Ok(segment) => State::Done(segment),
            Err(SynthesisError::MarkupUnsupported(reason)) => {
                log::warn!("Voice {voice} rejected markup ({reason}), retrying as plain text");
                State::Fallback
            }
            Err(SynthesisError::Transient(reason)) if retries < self.policy.max_retries => {
                log::warn!(
                    "Transient failure for voice {voice}: {reason} (retry {}/{})",
                    retries + 1,
                    self.policy.max_retries
                );
                self.stats.retried += 1;
                if self.policy.retry_delay_ms > 0 {
                    thread::sleep(Duration::from_millis(self.policy.retry_delay_ms));
                }
                State::Attempt {
                    retries: retries + 1,
                }
            }
            Err(SynthesisError::Transient(reason)) => State::Failed(SynthesisError::Fatal(format!(
                "gave up after {} attempts: {reason}",
                retries + 1
            ))),
            Err(SynthesisError::Fatal(reason)) => State::Failed(SynthesisError::Fatal(reason)),
        }
    }

    fn fallback(&mut self, markup: &str, voice: &str, language: &str) -> State {
        self.stats.fell_back += 1;
        let plain = strip_markup(markup);
        let request = SynthesisRequest {
            input: SynthesisInput::PlainText(&plain),
            voice,
            language,
        };
        match self.call(&request) {
            Ok(mut segment) => {
                segment.fell_back = true;
                segment.audio.marks.clear();
                State::Done(segment)
            }
            Err(err) => State::Failed(SynthesisError::Fatal(format!(
                "plain-text fallback failed: {err}"
            ))),
        }
    }

    fn call(&mut self, request: &SynthesisRequest<'_>) -> Result<AudioSegment, SynthesisError> {
        let audio = self.engine.synthesize(request)?;
        let duration_secs = audio.duration_secs();
        if duration_secs <= 0.0 {
            return Err(SynthesisError::Transient(
                "duration probed as zero".to_string(),
            ));
        }
        Ok(AudioSegment {
            audio,
            duration_secs,
            fell_back: false,
        })
    }
}
