//! WAV decoding, duration probing and track assembly.
//!
//! Segments are kept as mono f32 samples; a track is written once, as a
//! 32-bit float WAV, after every segment and silence has been appended.
//! Voices need not agree on a sample rate: segments are resampled to the
//! rate of the first segment in the track.

use std::io::Cursor;
use std::path::Path;

use rubato::{FftFixedIn, Resampler};

use crate::SynthesisResult;

/// Input frames per resampler chunk.
const RESAMPLE_CHUNK: usize = 1024;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),
    #[error("Resampler setup failed: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),
    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
    #[error("WAV has zero channels")]
    NoChannels,
    #[error("Track has no audio segments")]
    EmptyTrack,
}

/// Decode WAV bytes into mono f32 samples and the sample rate.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::NoChannels);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

/// Write mono samples to a 32-bit float WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Number of samples covering `secs` at `sample_rate`.
pub fn samples_for(secs: f64, sample_rate: u32) -> usize {
    (secs.max(0.0) * sample_rate as f64).round() as usize
}

/// Resample mono `samples` from `from` Hz to `to` Hz.
///
/// The output holds exactly the number of samples covering the input's
/// duration at the new rate, so timing computed from the source is kept.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, AudioError> {
    if from == 0 {
        return Err(AudioError::InvalidSampleRate(from));
    }
    if to == 0 {
        return Err(AudioError::InvalidSampleRate(to));
    }
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let target = samples_for(samples.len() as f64 / from as f64, to);
    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)?;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(target + delay);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let next = resampler.input_frames_next();
        let chunk = [&samples[pos..pos + next]];
        let frames = resampler.process(&chunk[..], None)?;
        output.extend_from_slice(&frames[0]);
        pos += next;
    }
    if pos < samples.len() {
        let chunk = [&samples[pos..]];
        let frames = resampler.process_partial(Some(&chunk[..]), None)?;
        output.extend_from_slice(&frames[0]);
    }
    while output.len() < target + delay {
        let frames = resampler.process_partial::<&[f32]>(None, None)?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(target, 0.0);
    Ok(output)
}

#[derive(Debug, Clone)]
enum Piece {
    Segment(Vec<f32>),
    Silence(f64),
}

/// Ordered segments and silences for one track.
///
/// The sample rate is fixed by the first segment; later segments at another
/// rate are resampled to it. Silences are rendered at that rate when the
/// track is finished.
#[derive(Debug, Clone, Default)]
pub struct AudioTrack {
    sample_rate: Option<u32>,
    pieces: Vec<Piece>,
}

impl AudioTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn push_segment(&mut self, segment: &SynthesisResult) -> Result<(), AudioError> {
        let samples = match self.sample_rate {
            Some(rate) if rate != segment.sample_rate => {
                log::debug!("Resampling segment from {} Hz to {rate} Hz", segment.sample_rate);
                resample(&segment.samples, segment.sample_rate, rate)?
            }
            Some(_) => segment.samples.clone(),
            None => {
                if segment.sample_rate == 0 {
                    return Err(AudioError::InvalidSampleRate(0));
                }
                self.sample_rate = Some(segment.sample_rate);
                segment.samples.clone()
            }
        };
        self.pieces.push(Piece::Segment(samples));
        Ok(())
    }

    pub fn push_silence(&mut self, secs: f64) {
        if secs > 0.0 {
            self.pieces.push(Piece::Silence(secs));
        }
    }

    /// Append every piece of `other` after this track's pieces, resampling
    /// its segments when the two tracks run at different rates.
    pub fn append(&mut self, other: AudioTrack) -> Result<(), AudioError> {
        match (self.sample_rate, other.sample_rate) {
            (Some(rate), Some(found)) if rate != found => {
                log::debug!("Resampling appended track from {found} Hz to {rate} Hz");
                let pieces = other
                    .pieces
                    .into_iter()
                    .map(|piece| match piece {
                        Piece::Segment(samples) => {
                            resample(&samples, found, rate).map(Piece::Segment)
                        }
                        silence => Ok(silence),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.pieces.extend(pieces);
            }
            (None, found) => {
                self.sample_rate = found;
                self.pieces.extend(other.pieces);
            }
            _ => self.pieces.extend(other.pieces),
        }
        Ok(())
    }

    /// Render all pieces into one contiguous buffer.
    pub fn finish(&self) -> Result<SynthesisResult, AudioError> {
        let sample_rate = self.sample_rate.ok_or(AudioError::EmptyTrack)?;
        let mut samples = Vec::new();
        for piece in &self.pieces {
            match piece {
                Piece::Segment(segment) => samples.extend_from_slice(segment),
                Piece::Silence(secs) => {
                    samples.resize(samples.len() + samples_for(*secs, sample_rate), 0.0)
                }
            }
        }
        Ok(SynthesisResult {
            samples,
            sample_rate,
            marks: Vec::new(),
        })
    }
}
