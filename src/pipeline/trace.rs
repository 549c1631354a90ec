// Analysis tracing
// Structured per-stage diagnostics, optionally appended to a JSONL file

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Analysis stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Grouping,
    Clustering,
    Rating,
    Tracking,
    Quantization,
    Hierarchy,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Grouping => "grouping",
            Stage::Clustering => "clustering",
            Stage::Rating => "rating",
            Stage::Tracking => "tracking",
            Stage::Quantization => "quantization",
            Stage::Hierarchy => "hierarchy",
        }
    }
}

/// A single entry in the analysis trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Analysis run this entry belongs to
    pub run_id: Uuid,

    /// RFC 3339 timestamp of when this entry was created
    pub timestamp: String,

    pub stage: Stage,

    /// Progress within the stage [0.0, 1.0]
    pub progress: f32,

    /// Human-readable message describing current operation
    pub message: String,

    /// Optional structured data (intermediate clusters, trackers, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Create a new trace entry with current timestamp
    pub fn new(run_id: Uuid, stage: Stage, progress: f32, message: String) -> Self {
        TraceEntry {
            run_id,
            timestamp: Utc::now().to_rfc3339(),
            stage,
            progress: progress.clamp(0.0, 1.0),
            message,
            data: None,
        }
    }

    /// Attach structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Helper builder for creating trace entries of one stage
#[derive(Debug, Clone, Copy)]
pub struct TraceBuilder {
    run_id: Uuid,
    stage: Stage,
}

impl TraceBuilder {
    pub fn new(run_id: Uuid, stage: Stage) -> Self {
        TraceBuilder { run_id, stage }
    }

    /// Create a start entry (progress = 0.0)
    pub fn start(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, self.stage, 0.0, message.into())
    }

    /// Create a progress entry
    pub fn progress(self, progress: f32, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, self.stage, progress, message.into())
    }

    /// Create a complete entry (progress = 1.0)
    pub fn complete(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, self.stage, 1.0, message.into())
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

    /// Append entries to the file, creating it if it doesn't exist
    pub fn write_batch(&self, entries: &[TraceEntry]) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        for entry in entries {
            let json_line = entry.to_json_line()?;
            file.write_all(json_line.as_bytes())?;
        }

        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: TraceEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}
