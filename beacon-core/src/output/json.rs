use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{open_append, Exporter, OutputFormatter};
use crate::bulk::RunSummary;
use crate::error::{BeaconError, Result};
use crate::probe::OutcomeRecord;
use crate::validation::NormalizedTarget;

pub struct JsonFormatter {
    pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn to_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        } else {
            serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_header(&self) -> Option<String> {
        None
    }

    // One object per line so the stream stays line-delimited.
    fn format_outcome(&self, record: &OutcomeRecord) -> String {
        serde_json::to_string(record).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }

    fn format_summary(&self, summary: &RunSummary) -> String {
        self.to_json(summary)
    }

    fn format_normalized(&self, target: &NormalizedTarget) -> String {
        serde_json::to_string(target).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

/// Durable results journal: one JSON record per line, synced to disk per record.
pub struct JsonLinesExporter {
    path: PathBuf,
    file: File,
}

impl JsonLinesExporter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self { path, file })
    }
}

impl Exporter for JsonLinesExporter {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn export(&mut self, record: &OutcomeRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.sync_data())
            .map_err(|e| BeaconError::persistence(&self.path, e))
    }

    fn finish(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| BeaconError::persistence(&self.path, e))
    }
}
