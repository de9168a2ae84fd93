//! Run progress, snapshots, and the on-disk state file.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{BeaconError, Result};
use crate::probe::Verdict;

/// Aggregate counters for one run.
///
/// `completed == working_count + not_working_count` always holds; invalid
/// targets count as not working and are also tallied in `invalid_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    pub total: usize,
    pub completed: usize,
    pub working_count: usize,
    pub not_working_count: usize,
    pub invalid_count: usize,
}

impl RunCounters {
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }

    fn count(&mut self, verdict: Verdict) {
        self.completed += 1;
        match verdict {
            Verdict::Working => self.working_count += 1,
            Verdict::NotWorking => self.not_working_count += 1,
            Verdict::Invalid => {
                self.not_working_count += 1;
                self.invalid_count += 1;
            }
        }
    }
}

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotReason {
    Paused,
    Cancelled,
    ForceExit,
    Interrupted,
    Periodic,
    Completed,
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotReason::Paused => "PAUSED",
            SnapshotReason::Cancelled => "CANCELLED",
            SnapshotReason::ForceExit => "FORCE_EXIT",
            SnapshotReason::Interrupted => "INTERRUPTED",
            SnapshotReason::Periodic => "PERIODIC",
            SnapshotReason::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// Point-in-time serialization of run progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub reason: SnapshotReason,
    pub timestamp: DateTime<Utc>,
    pub completed: usize,
    pub total: usize,
    pub working_count: usize,
    pub not_working_count: usize,
    #[serde(default)]
    pub invalid_count: usize,
    /// Every target not yet reported, in submission order (in-flight ones included)
    pub remaining_targets: Vec<String>,
}

impl Snapshot {
    /// Checks that the counts and the remaining list describe one run.
    pub fn verify(&self) -> Result<()> {
        let counted = self.working_count.checked_add(self.not_working_count);
        if counted != Some(self.completed) {
            return Err(BeaconError::InconsistentState(format!(
                "completed ({}) != working ({}) + not working ({})",
                self.completed, self.working_count, self.not_working_count
            )));
        }
        let accounted = self.completed.checked_add(self.remaining_targets.len());
        if accounted != Some(self.total) {
            return Err(BeaconError::InconsistentState(format!(
                "completed ({}) + remaining ({}) != total ({})",
                self.completed,
                self.remaining_targets.len(),
                self.total
            )));
        }
        if self.invalid_count > self.not_working_count {
            return Err(BeaconError::InconsistentState(format!(
                "invalid ({}) exceeds not working ({})",
                self.invalid_count, self.not_working_count
            )));
        }
        Ok(())
    }

    pub fn counters(&self) -> RunCounters {
        RunCounters {
            total: self.total,
            completed: self.completed,
            working_count: self.working_count,
            not_working_count: self.not_working_count,
            invalid_count: self.invalid_count,
        }
    }
}

/// Mutable progress of one run. Owned by the result sink and only touched
/// under its lock.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    counters: RunCounters,
    targets: Vec<String>,
    reported: Vec<bool>,
    paused: bool,
    stopped: bool,
}

impl RunState {
    /// Fresh run over `targets`; `total` is the number of targets.
    pub fn new(targets: Vec<String>) -> Self {
        let counters = RunCounters {
            total: targets.len(),
            ..RunCounters::default()
        };
        Self {
            counters,
            reported: vec![false; targets.len()],
            targets,
            paused: false,
            stopped: false,
        }
    }

    /// Continues a run from a snapshot: its counters are the baseline and its
    /// remaining targets become the queue.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        snapshot.verify()?;
        let counters = snapshot.counters();
        let targets = snapshot.remaining_targets;
        Ok(Self {
            counters,
            reported: vec![false; targets.len()],
            targets,
            paused: false,
            stopped: false,
        })
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Targets queued in this session, indexed by dispatch slot.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn set_stopped(&mut self) {
        self.stopped = true;
        self.paused = false;
    }

    /// Records the verdict for the target in slot `index`.
    ///
    /// Returns false (and changes nothing) for an unknown slot or one that was
    /// already reported.
    pub(crate) fn record(&mut self, index: usize, verdict: Verdict) -> bool {
        match self.reported.get_mut(index) {
            Some(seen) if !*seen => {
                *seen = true;
                self.counters.count(verdict);
                true
            }
            _ => false,
        }
    }

    /// Targets not yet reported, in submission order.
    pub fn remaining_targets(&self) -> Vec<String> {
        self.targets
            .iter()
            .zip(&self.reported)
            .filter(|(_, reported)| !**reported)
            .map(|(target, _)| target.clone())
            .collect()
    }

    pub fn snapshot(&self, reason: SnapshotReason) -> Snapshot {
        Snapshot {
            reason,
            timestamp: Utc::now(),
            completed: self.counters.completed,
            total: self.counters.total,
            working_count: self.counters.working_count,
            not_working_count: self.counters.not_working_count,
            invalid_count: self.counters.invalid_count,
            remaining_targets: self.remaining_targets(),
        }
    }
}

/// JSON state file holding the latest snapshot.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the state file with `snapshot`.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| BeaconError::persistence(&dir, e))?;

        let content = serde_json::to_string_pretty(snapshot)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| BeaconError::persistence(&dir, e))?;
        write_synced(&mut tmp, content.as_bytes())
            .map_err(|e| BeaconError::persistence(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| BeaconError::persistence(&self.path, e.error))?;

        debug!(
            path = %self.path.display(),
            reason = %snapshot.reason,
            remaining = snapshot.remaining_targets.len(),
            "Snapshot written"
        );
        Ok(())
    }

    /// Reads the last snapshot, or `None` when no state file exists.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BeaconError::persistence(&self.path, e)),
        };
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    /// Reads and verifies the last snapshot and rebuilds the run state from it.
    pub fn restore(&self) -> Result<Option<RunState>> {
        let Some(snapshot) = self.load()? else {
            return Ok(None);
        };
        info!(
            path = %self.path.display(),
            reason = %snapshot.reason,
            completed = snapshot.completed,
            total = snapshot.total,
            "Restoring run state"
        );
        RunState::from_snapshot(snapshot).map(Some)
    }
}

fn write_synced(tmp: &mut NamedTempFile, bytes: &[u8]) -> std::io::Result<()> {
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()
}
