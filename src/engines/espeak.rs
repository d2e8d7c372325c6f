//! espeak-ng command-line engine.
//!
//! Runs `espeak-ng --stdout` once per request and decodes the WAV it writes.
//! In markup mode `-m` is passed so `<break>` and `<mark>` elements are
//! interpreted rather than spoken.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed, or a bundled binary supplied through
//! [`EspeakEngine::with_espeak`]:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! The command-line interface does not report mark positions, so results
//! from this engine carry no timepoints.

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::{SynthesisEngine, SynthesisError, SynthesisRequest, SynthesisResult};

/// Location of the espeak-ng binary and its data directory.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    /// `None` runs `espeak-ng` from PATH
    pub bin_path: Option<PathBuf>,
    /// Exported as `ESPEAK_DATA_PATH` when set
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let bin = self
            .bin_path
            .as_deref()
            .unwrap_or_else(|| Path::new("espeak-ng"));
        let mut command = Command::new(bin);
        if let Some(data) = &self.data_path {
            command.env("ESPEAK_DATA_PATH", data);
        }
        command
    }
}

/// Text-to-speech through the espeak-ng binary.
///
/// ```rust,no_run
/// use narration_sync::engines::espeak::EspeakEngine;
/// use std::path::PathBuf;
///
/// // Point to a bundled espeak-ng binary and data directory
/// let engine = EspeakEngine::with_espeak(
///     Some(PathBuf::from("/app/resources/espeak-ng/espeak-ng")),
///     Some(PathBuf::from("/app/resources/espeak-ng-data")),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct EspeakEngine {
    espeak: EspeakConfig,
    words_per_minute: Option<u32>,
}

impl EspeakEngine {
    /// Create an engine that uses `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with explicit binary and data paths. Either can be
    /// `None` to fall back to the system default.
    pub fn with_espeak(bin_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Self {
        Self {
            espeak: EspeakConfig {
                bin_path,
                data_path,
            },
            words_per_minute: None,
        }
    }

    /// Speaking rate passed as `-s`.
    pub fn with_speed(mut self, words_per_minute: u32) -> Self {
        self.words_per_minute = Some(words_per_minute);
        self
    }

    fn args(&self, request: &SynthesisRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "-v".to_string(),
            request.voice.to_string(),
            "-b".to_string(),
            "1".to_string(),
            "--stdout".to_string(),
            "--stdin".to_string(),
        ];
        if request.input.is_markup() {
            args.push("-m".to_string());
        }
        if let Some(wpm) = self.words_per_minute {
            args.push("-s".to_string());
            args.push(wpm.to_string());
        }
        args
    }
}

impl SynthesisEngine for EspeakEngine {
    fn synthesize(
        &mut self,
        request: &SynthesisRequest<'_>,
    ) -> Result<SynthesisResult, SynthesisError> {
        let mut child = self
            .espeak
            .command()
            .args(self.args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SynthesisError::Fatal(
                        "espeak-ng not found. Install espeak-ng or provide a bundled path"
                            .to_string(),
                    )
                } else {
                    SynthesisError::Fatal(format!("failed to start espeak-ng: {e}"))
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_payload(request.input.text()).as_bytes())
                .map_err(|e| SynthesisError::classify(format!("writing to espeak-ng: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SynthesisError::classify(format!("waiting for espeak-ng: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::classify(format!(
                "espeak-ng exited with code {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        log::debug!(
            "espeak-ng produced {} bytes for voice {}",
            output.stdout.len(),
            request.voice
        );
        SynthesisResult::from_wav_bytes(&output.stdout).map_err(|e| {
            SynthesisError::Transient(format!("unreadable audio from espeak-ng: {e}"))
        })
    }
}

/// espeak-ng reads stdin line by line; an unterminated last line can be
/// dropped.
fn stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::{stdin_payload, EspeakEngine};
    use crate::{SynthesisEngine, SynthesisError, SynthesisInput, SynthesisRequest};
    use std::path::PathBuf;

    fn request(input: SynthesisInput<'_>) -> SynthesisRequest<'_> {
        SynthesisRequest {
            input,
            voice: "ko",
            language: "ko-KR",
        }
    }

    #[test]
    fn markup_mode_adds_the_markup_flag() {
        let engine = EspeakEngine::new().with_speed(150);
        let args = engine.args(&request(SynthesisInput::Markup("<speak/>")));
        assert_eq!(
            args,
            vec!["-v", "ko", "-b", "1", "--stdout", "--stdin", "-m", "-s", "150"]
        );

        let args = EspeakEngine::new().args(&request(SynthesisInput::PlainText("hi")));
        assert!(!args.iter().any(|a| a == "-m"));
    }

    #[test]
    fn stdin_is_newline_terminated() {
        assert_eq!(stdin_payload("hi"), "hi\n");
        assert_eq!(stdin_payload("hi\n"), "hi\n");
    }

    #[test]
    fn missing_binary_is_fatal() {
        let mut engine = EspeakEngine::with_espeak(
            Some(PathBuf::from("/nonexistent/espeak-ng-for-tests")),
            None,
        );
        let err = engine
            .synthesize(&request(SynthesisInput::PlainText("hi")))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Fatal(_)));
    }
}
