//! Timing interchange files.
//!
//! A timing file is a JSON array of [`TimingEntry`] objects in playback
//! order, the exact shape the encoder reads.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::timeline::TimingEntry;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize timing entries: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize entries as a pretty-printed JSON array.
pub fn to_json(entries: &[TimingEntry]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Write entries to `path`, creating parent directories.
pub fn write_timing_file(path: &Path, entries: &[TimingEntry]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut writer, entries)?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    log::info!("Wrote {} timing entries to {}", entries.len(), path.display());
    Ok(())
}

/// Read a timing file back.
pub fn read_timing_file(path: &Path) -> Result<Vec<TimingEntry>, ExportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::{read_timing_file, to_json, write_timing_file};
    use crate::scene::SpeakerTag;
    use crate::timeline::TimingEntry;

    fn entry(speaker: SpeakerTag, start: f64, end: f64) -> TimingEntry {
        TimingEntry {
            scene_id: "conversation_01".to_string(),
            speaker,
            text: "안녕".to_string(),
            image_filename: format!("lesson_conversation_001_{}.png", speaker.screen()),
            start_time: start,
            end_time: end,
            duration: end - start,
        }
    }

    #[test]
    fn uses_interchange_field_names() {
        let json = to_json(&[entry(SpeakerTag::Learner(0), 1.8, 2.7)]).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        let row = &value[0];

        assert_eq!(row["scene_id"], "conversation_01");
        assert_eq!(row["speaker"], "learner1");
        assert_eq!(row["image_filename"], "lesson_conversation_001_2.png");
        assert_eq!(row["start_time"], 1.8);
        assert_eq!(row["end_time"], 2.7);
        assert!(row.get("duration").is_some());
    }

    #[test]
    fn writes_into_missing_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("timing").join("lesson_conversation.json");
        let entries = vec![
            entry(SpeakerTag::Native, 0.0, 0.8),
            entry(SpeakerTag::Learner(0), 1.8, 2.7),
        ];

        write_timing_file(&path, &entries).expect("write");
        assert_eq!(read_timing_file(&path).expect("read"), entries);
    }
}
