// Pipeline progress tracing
// Optional append-only JSONL record of each merge stage

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Stages of a merge run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Read and parse the recording
    Load,
    /// Select both streams, resample and concatenate
    Align,
    /// Write the merged matrix
    Persist,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 3] = [
        PipelineStage::Load,
        PipelineStage::Align,
        PipelineStage::Persist,
    ];

    /// Fraction of the run completed once this stage is done
    pub fn progress(&self) -> f32 {
        let position = Self::ALL.iter().position(|s| s == self).unwrap_or(0) + 1;
        position as f32 / Self::ALL.len() as f32
    }
}

/// One line of the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 time the entry was created
    pub timestamp: String,

    pub stage: PipelineStage,

    /// Progress of the whole run [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Entry marking `stage` as completed
    pub fn completed(stage: PipelineStage, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            progress: stage.progress(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to a JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries to a JSONL trace file, creating it on first write
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    pub fn append(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let line = entry.to_json_line()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries back from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TraceError::from))
        .collect()
}
