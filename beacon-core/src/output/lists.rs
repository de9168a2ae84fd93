use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{open_append, Exporter};
use crate::error::{BeaconError, Result};
use crate::probe::OutcomeRecord;

/// Splits raw inputs into a working list and a not-working list, one per line.
pub struct ListExporter {
    valid_path: PathBuf,
    invalid_path: PathBuf,
    valid: File,
    invalid: File,
}

impl ListExporter {
    pub fn create(valid_path: impl AsRef<Path>, invalid_path: impl AsRef<Path>) -> Result<Self> {
        let valid_path = valid_path.as_ref().to_path_buf();
        let invalid_path = invalid_path.as_ref().to_path_buf();
        Ok(Self {
            valid: open_append(&valid_path)?,
            invalid: open_append(&invalid_path)?,
            valid_path,
            invalid_path,
        })
    }

    /// `valid.txt` and `invalid.txt` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Self::create(dir.join("valid.txt"), dir.join("invalid.txt"))
    }
}

impl Exporter for ListExporter {
    fn name(&self) -> &'static str {
        "lists"
    }

    fn export(&mut self, record: &OutcomeRecord) -> Result<()> {
        let (file, path) = if record.verdict.is_working() {
            (&mut self.valid, &self.valid_path)
        } else {
            (&mut self.invalid, &self.invalid_path)
        };
        writeln!(file, "{}", record.raw_input).map_err(|e| BeaconError::persistence(path, e))
    }

    fn finish(&mut self) -> Result<()> {
        self.valid
            .flush()
            .map_err(|e| BeaconError::persistence(&self.valid_path, e))?;
        self.invalid
            .flush()
            .map_err(|e| BeaconError::persistence(&self.invalid_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutcome;
    use crate::validation::Normalizer;

    #[test]
    fn test_lists_split_by_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let normalizer = Normalizer::default();
        let mut exporter = ListExporter::in_dir(dir.path()).unwrap();

        let ok = normalizer.normalize("example.com");
        exporter
            .export(&ProbeOutcome::checked(ok, true, true, Some(200), 1).record())
            .unwrap();
        let down = normalizer.normalize("down.example.org");
        exporter
            .export(&ProbeOutcome::checked(down, false, false, None, 1).record())
            .unwrap();
        let bad = normalizer.normalize("bad.png");
        exporter
            .export(&ProbeOutcome::invalid(bad).record())
            .unwrap();
        exporter.finish().unwrap();

        let valid = std::fs::read_to_string(dir.path().join("valid.txt")).unwrap();
        let invalid = std::fs::read_to_string(dir.path().join("invalid.txt")).unwrap();
        assert_eq!(valid, "example.com\n");
        assert_eq!(invalid, "down.example.org\nbad.png\n");
    }
}
