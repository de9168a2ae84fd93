use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{open_append, Exporter};
use crate::error::{BeaconError, Result};
use crate::probe::OutcomeRecord;

pub const CSV_HEADER: &str = "domain,canonical_url,host,dns,tls,http,status,duration_ms";

/// Appends one CSV row per record. The header is written only when the file
/// starts out empty, so a resumed run keeps extending the same table.
pub struct CsvExporter {
    path: PathBuf,
    file: File,
}

impl CsvExporter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = open_append(&path)?;
        let len = file
            .metadata()
            .map_err(|e| BeaconError::persistence(&path, e))?
            .len();
        if len == 0 {
            writeln!(file, "{}", CSV_HEADER).map_err(|e| BeaconError::persistence(&path, e))?;
        }
        Ok(Self { path, file })
    }
}

impl Exporter for CsvExporter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn export(&mut self, record: &OutcomeRecord) -> Result<()> {
        writeln!(self.file, "{}", csv_row(record)).map_err(|e| BeaconError::persistence(&self.path, e))
    }

    fn finish(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| BeaconError::persistence(&self.path, e))
    }
}

fn csv_row(record: &OutcomeRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        escape_csv_field(&record.raw_input),
        escape_csv_field(&record.canonical_url),
        escape_csv_field(&record.host),
        record.dns_ok,
        record.tls_ok,
        record.http_code.map(|c| c.to_string()).unwrap_or_default(),
        record.verdict,
        record.duration_ms
    )
}

fn escape_csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
