//! Console formatters and file exporters for probe results.
//!
//! Formatters turn records into display strings; exporters append records to
//! files. Both consume the flat [`OutcomeRecord`], so adding a format never
//! touches the engine.

mod csv;
mod human;
mod json;
mod lists;

pub use self::csv::CsvExporter;
pub use human::HumanFormatter;
pub use json::{JsonFormatter, JsonLinesExporter};
pub use lists::ListExporter;

use std::fs::{File, OpenOptions};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bulk::RunSummary;
use crate::error::{BeaconError, Result};
use crate::probe::OutcomeRecord;
use crate::validation::NormalizedTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" | "pretty" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

pub trait OutputFormatter: Send + Sync {
    /// Column header printed before the first row, if the format has one.
    fn format_header(&self) -> Option<String>;
    fn format_outcome(&self, record: &OutcomeRecord) -> String;
    fn format_summary(&self, summary: &RunSummary) -> String;
    fn format_normalized(&self, target: &NormalizedTarget) -> String;
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter::new()),
        // Compact so stdout stays one JSON document per line.
        OutputFormat::Json => Box::new(JsonFormatter::new().compact()),
    }
}

/// Append-only destination for per-target records.
///
/// Exporters are driven by the result sink under its lock, one record at a
/// time, so implementations need no synchronization of their own.
pub trait Exporter: Send {
    fn name(&self) -> &'static str;

    fn export(&mut self, record: &OutcomeRecord) -> Result<()>;

    /// Flushes buffered output once the run ends.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens `path` for appending, creating it and its parent directory.
pub(crate) fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BeaconError::persistence(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BeaconError::persistence(path, e))
}
