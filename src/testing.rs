//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

use crate::{SynthesisEngine, SynthesisError, SynthesisRequest, SynthesisResult};

pub const TEST_RATE: u32 = 16000;

/// A constant tone lasting `secs` at [`TEST_RATE`].
pub fn tone(secs: f64) -> SynthesisResult {
    SynthesisResult {
        samples: vec![0.1; crate::audio::samples_for(secs, TEST_RATE)],
        sample_rate: TEST_RATE,
        marks: Vec::new(),
    }
}

/// Encode samples as a 16-bit PCM WAV file in memory.
pub fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for &sample in samples {
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize");
    }
    cursor.into_inner()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub markup: bool,
    pub voice: String,
    pub text: String,
}

type Response = Result<SynthesisResult, SynthesisError>;

/// Engine double answering from per-voice scripts.
///
/// Scripted responses are consumed in order; once a voice's script is empty
/// its `always` response (if any) is repeated.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: HashMap<String, VecDeque<Response>>,
    always: HashMap<String, Response>,
    pub calls: Vec<RecordedCall>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, voice: &str, response: Response) -> Self {
        self.scripts
            .entry(voice.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn always(mut self, voice: &str, response: Response) -> Self {
        self.always.insert(voice.to_string(), response);
        self
    }

    pub fn calls_for(&self, voice: &str) -> usize {
        self.calls.iter().filter(|c| c.voice == voice).count()
    }
}

impl SynthesisEngine for ScriptedEngine {
    fn synthesize(&mut self, request: &SynthesisRequest<'_>) -> Response {
        self.calls.push(RecordedCall {
            markup: request.input.is_markup(),
            voice: request.voice.to_string(),
            text: request.input.text().to_string(),
        });

        if let Some(next) = self
            .scripts
            .get_mut(request.voice)
            .and_then(|queue| queue.pop_front())
        {
            return next;
        }
        self.always.get(request.voice).cloned().unwrap_or_else(|| {
            Err(SynthesisError::Fatal(format!(
                "no scripted response for voice {}",
                request.voice
            )))
        })
    }
}
