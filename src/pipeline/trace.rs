// Pipeline progress tracing
// Append-only JSONL trace of the stages a transcription request went through

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed trace line: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stages of the notation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcribe,
    Parse,
    Transpose,
    Quantize,
    Prune,
    Clamp,
    Tab,
    Layout,
    Assemble,
    Serialize,
    Store,
}

impl Stage {
    /// Position of the stage in a full run, as a fraction
    pub fn progress(&self) -> f32 {
        let index = match self {
            Stage::Transcribe => 0,
            Stage::Parse => 1,
            Stage::Transpose => 2,
            Stage::Quantize => 3,
            Stage::Prune => 4,
            Stage::Clamp => 5,
            Stage::Tab => 6,
            Stage::Layout => 7,
            Stage::Assemble => 8,
            Stage::Serialize => 9,
            Stage::Store => 10,
        };
        (index + 1) as f32 / 11.0
    }
}

/// One line of a request's trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,

    pub stage: Stage,

    /// Progress through the whole run [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Optional structured data (counts, warnings)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            progress: stage.progress().clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(stage: Stage, message: impl Into<String>, data: serde_json::Value) -> Self {
        TraceEntry {
            data: Some(data),
            ..TraceEntry::new(stage, message)
        }
    }

    /// Newline-terminated JSON
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// In-memory trace collected while a pipeline runs
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
}

impl TraceLog {
    pub fn record(&mut self, stage: Stage, message: impl Into<String>) {
        let entry = TraceEntry::new(stage, message);
        log::debug!("[{:?}] {}", entry.stage, entry.message);
        self.entries.push(entry);
    }

    pub fn record_data(&mut self, stage: Stage, message: impl Into<String>, data: serde_json::Value) {
        let entry = TraceEntry::with_data(stage, message, data);
        log::debug!("[{:?}] {}", entry.stage, entry.message);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

/// Append-only JSONL trace file
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Append a trace entry, creating the file if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        self.write_batch(std::slice::from_ref(entry))
    }

    /// Append entries in order with a single open of the file
    pub fn write_batch(&self, entries: &[TraceEntry]) -> Result<(), TraceError> {
        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&entry.to_json_line()?);
        }

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Load every entry of a trace file; blank lines are skipped
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    std::fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TraceError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_progress_increases() {
        assert!(Stage::Parse.progress() < Stage::Quantize.progress());
        assert!(Stage::Serialize.progress() < Stage::Store.progress());
        assert_eq!(Stage::Store.progress(), 1.0);
    }

    #[test]
    fn test_trace_entry_with_data() {
        let entry = TraceEntry::with_data(
            Stage::Prune,
            "Removed short notes",
            serde_json::json!({ "removed": 3 }),
        );
        assert_eq!(entry.stage, Stage::Prune);
        assert_eq!(entry.data.unwrap()["removed"], 3);
    }

    #[test]
    fn test_trace_log_collects_in_order() {
        let mut trace = TraceLog::default();
        trace.record(Stage::Parse, "Parsed");
        trace.record_data(Stage::Quantize, "Snapped", serde_json::json!({ "events": 4 }));

        let entries = trace.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, Stage::Parse);
        assert!(entries[1].data.is_some());
    }

    #[test]
    fn test_trace_writer_appends() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("traces").join("request.jsonl");
        let writer = TraceWriter::new(trace_path.clone());

        writer.write(&TraceEntry::new(Stage::Parse, "Start")).unwrap();
        writer
            .write_batch(&[
                TraceEntry::new(Stage::Layout, "Laid out"),
                TraceEntry::new(Stage::Serialize, "Done"),
            ])
            .unwrap();

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].stage, Stage::Parse);
        assert_eq!(entries[2].stage, Stage::Serialize);
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jsonl");
        std::fs::write(&path, "{\"stage\":\"parse\"\n").unwrap();
        assert!(matches!(read_trace_file(&path), Err(TraceError::Json(_))));
    }

    #[test]
    fn test_json_line_format() {
        let entry = TraceEntry::new(Stage::Tab, "Mapped");
        let json_line = entry.to_json_line().unwrap();

        assert!(json_line.ends_with('\n'));
        assert!(json_line.contains("\"stage\":\"tab\""));
        let parsed: TraceEntry = serde_json::from_str(json_line.trim()).unwrap();
        assert_eq!(parsed.stage, Stage::Tab);
    }
}
