use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::{BeaconError, Result};
use crate::validation::Normalizer;

/// Targets read from an input list, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    pub targets: Vec<String>,
    /// Lines dropped because their canonical URL was already seen.
    pub duplicates: usize,
}

/// Parses one target per line. Blank lines and `#` comments are skipped.
///
/// With `dedupe`, later lines whose canonical URL matches an earlier one are
/// dropped; implausible lines are compared by their trimmed text.
pub fn parse_targets(content: &str, normalizer: &Normalizer, dedupe: bool) -> TargetList {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut seen = HashSet::new();
    let mut list = TargetList::default();

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if dedupe {
            let target = normalizer.normalize(line);
            let key = if target.is_plausible {
                target.canonical_url
            } else {
                target.raw_input
            };
            if !seen.insert(key) {
                list.duplicates += 1;
                continue;
            }
        }
        list.targets.push(line.to_string());
    }

    list
}

/// Reads and parses an input file. A missing or unreadable file is an input error.
pub fn load_targets(path: &Path, normalizer: &Normalizer, dedupe: bool) -> Result<TargetList> {
    let bytes = std::fs::read(path).map_err(|source| BeaconError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let list = parse_targets(&String::from_utf8_lossy(&bytes), normalizer, dedupe);
    debug!(
        path = %path.display(),
        targets = list.targets.len(),
        duplicates = list.duplicates,
        "Loaded input list"
    );
    Ok(list)
}
