//! Collects probe outcomes from all workers.
//!
//! The sink owns the run's single [`RunState`]. Every mutation (counters,
//! exporter writes, snapshots) happens under one mutex, so concurrent
//! workers never interleave writes to the same file or counter.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::state::{RunCounters, RunState, Snapshot, SnapshotReason, StateStore};
use crate::output::Exporter;
use crate::probe::{OutcomeRecord, ProbeOutcome};

/// Receives per-target results and aggregate progress.
///
/// Callbacks run while the sink lock is held, so counters arrive in order.
/// Implementations must return quickly; hand work off to another task or
/// thread instead of blocking.
pub trait ProgressSink: Send + Sync {
    fn on_outcome(&self, record: &OutcomeRecord, counters: &RunCounters);

    fn on_snapshot(&self, _snapshot: &Snapshot) {}

    fn on_complete(&self, _counters: &RunCounters) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&OutcomeRecord, &RunCounters) + Send + Sync,
{
    fn on_outcome(&self, record: &OutcomeRecord, counters: &RunCounters) {
        self(record, counters)
    }
}

/// Events forwarded by [`ChannelProgressSink`].
#[derive(Debug, Clone)]
pub enum RunEvent {
    Outcome {
        record: OutcomeRecord,
        counters: RunCounters,
    },
    Snapshot(Snapshot),
    Completed(RunCounters),
}

/// Forwards progress over a channel so the consumer can handle it on its own task.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_outcome(&self, record: &OutcomeRecord, counters: &RunCounters) {
        let _ = self.tx.send(RunEvent::Outcome {
            record: record.clone(),
            counters: *counters,
        });
    }

    fn on_snapshot(&self, snapshot: &Snapshot) {
        let _ = self.tx.send(RunEvent::Snapshot(snapshot.clone()));
    }

    fn on_complete(&self, counters: &RunCounters) {
        let _ = self.tx.send(RunEvent::Completed(*counters));
    }
}

struct SinkInner {
    state: RunState,
    exporters: Vec<Box<dyn Exporter>>,
    finished: bool,
}

pub struct ResultSink {
    inner: Mutex<SinkInner>,
    progress: Vec<Arc<dyn ProgressSink>>,
    store: Option<StateStore>,
    checkpoint_every: usize,
    done: watch::Sender<bool>,
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink")
            .field("progress", &self.progress.len())
            .field("store", &self.store)
            .field("checkpoint_every", &self.checkpoint_every)
            .finish_non_exhaustive()
    }
}

impl ResultSink {
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Mutex::new(SinkInner {
                state: RunState::default(),
                exporters: Vec::new(),
                finished: false,
            }),
            progress: Vec::new(),
            store: None,
            checkpoint_every: 0,
            done,
        }
    }

    pub fn with_exporter(self, exporter: impl Exporter + 'static) -> Self {
        self.lock().exporters.push(Box::new(exporter));
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress.push(progress);
        self
    }

    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Writes a `PERIODIC` snapshot every `every` accepted outcomes (0 disables).
    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every;
        self
    }

    pub fn state_store(&self) -> Option<&StateStore> {
        self.store.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Result sink lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Installs the state for a new or resumed run.
    pub(crate) fn begin(&self, state: RunState) {
        let mut inner = self.lock();
        let counters = state.counters();
        inner.state = state;
        inner.finished = false;
        self.done.send_replace(false);
        debug!(
            total = counters.total,
            completed = counters.completed,
            "Result sink ready"
        );
        if counters.is_complete() {
            self.finish(&mut inner);
        }
    }

    /// Records the outcome for dispatch slot `index`.
    ///
    /// Returns false when the run was stopped or the slot was already
    /// reported; nothing is written in that case.
    pub fn accept(&self, index: usize, outcome: &ProbeOutcome) -> bool {
        let mut inner = self.lock();
        if inner.state.is_stopped() {
            debug!(input = %outcome.target.raw_input, "Run stopped, dropping late outcome");
            return false;
        }
        if !inner.state.record(index, outcome.verdict) {
            warn!(index, input = %outcome.target.raw_input, "Outcome already reported");
            return false;
        }

        let record = outcome.record();
        for exporter in inner.exporters.iter_mut() {
            if let Err(e) = exporter.export(&record) {
                error!(exporter = exporter.name(), error = %e, "Failed to export outcome");
            }
        }

        let counters = inner.state.counters();
        for progress in &self.progress {
            progress.on_outcome(&record, &counters);
        }

        if counters.is_complete() {
            self.finish(&mut inner);
        } else if self.checkpoint_every > 0 && counters.completed % self.checkpoint_every == 0 {
            let snapshot = inner.state.snapshot(SnapshotReason::Periodic);
            self.persist(&snapshot);
        }

        true
    }

    fn finish(&self, inner: &mut SinkInner) {
        if inner.finished {
            return;
        }
        inner.finished = true;

        for exporter in inner.exporters.iter_mut() {
            if let Err(e) = exporter.finish() {
                error!(exporter = exporter.name(), error = %e, "Failed to finish exporter");
            }
        }

        let snapshot = inner.state.snapshot(SnapshotReason::Completed);
        self.persist(&snapshot);

        let counters = inner.state.counters();
        info!(
            total = counters.total,
            working = counters.working_count,
            not_working = counters.not_working_count,
            "Run complete"
        );
        self.done.send_replace(true);
        for progress in &self.progress {
            progress.on_complete(&counters);
        }
    }

    fn persist(&self, snapshot: &Snapshot) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(snapshot) {
                error!(reason = %snapshot.reason, error = %e, "Failed to write snapshot");
            }
        }
        for progress in &self.progress {
            progress.on_snapshot(snapshot);
        }
    }

    /// Takes and persists a snapshot of the current state.
    pub fn snapshot(&self, reason: SnapshotReason) -> Snapshot {
        let inner = self.lock();
        let snapshot = inner.state.snapshot(reason);
        self.persist(&snapshot);
        snapshot
    }

    pub(crate) fn mark_paused(&self, paused: bool) {
        self.lock().state.set_paused(paused);
    }

    /// Stops accepting outcomes and persists the unreported remainder.
    ///
    /// Returns `None` when the run already finished or was already stopped.
    pub(crate) fn halt(&self, reason: SnapshotReason) -> Option<Snapshot> {
        let mut inner = self.lock();
        if inner.finished || inner.state.is_stopped() {
            return None;
        }
        inner.state.set_stopped();
        for exporter in inner.exporters.iter_mut() {
            if let Err(e) = exporter.finish() {
                error!(exporter = exporter.name(), error = %e, "Failed to finish exporter");
            }
        }
        let snapshot = inner.state.snapshot(reason);
        self.persist(&snapshot);
        info!(
            reason = %reason,
            remaining = snapshot.remaining_targets.len(),
            "Run halted"
        );
        Some(snapshot)
    }

    pub fn counters(&self) -> RunCounters {
        self.lock().state.counters()
    }

    pub fn remaining_targets(&self) -> Vec<String> {
        self.lock().state.remaining_targets()
    }

    pub fn is_paused(&self) -> bool {
        self.lock().state.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().state.is_stopped()
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Flips to `true` once every target has been reported.
    pub fn completion(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::JsonLinesExporter;
    use crate::probe::Verdict;
    use crate::validation::Normalizer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outcome(raw: &str, working: bool) -> ProbeOutcome {
        let target = Normalizer::default().normalize(raw);
        if working {
            ProbeOutcome::checked(target, true, true, Some(200), 1)
        } else {
            ProbeOutcome::checked(target, false, false, None, 1)
        }
    }

    fn state(names: &[&str]) -> RunState {
        RunState::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_accept_counts_and_reports_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let sink = ResultSink::new().with_progress(Arc::new(
            move |_: &OutcomeRecord, _: &RunCounters| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));
        sink.begin(state(&["a.com", "b.com"]));

        assert!(sink.accept(0, &outcome("a.com", true)));
        assert!(!sink.accept(0, &outcome("a.com", true)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counters = sink.counters();
        assert_eq!(counters.completed, 1);
        assert_eq!(counters.working_count, 1);
        assert!(!sink.is_finished());
    }

    #[test]
    fn test_completion_signal_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let sink = ResultSink::new().with_state_store(store.clone());
        let done = sink.completion();
        sink.begin(state(&["a.com", "b.com"]));

        sink.accept(1, &outcome("b.com", false));
        assert!(!*done.borrow());
        sink.accept(0, &outcome("a.com", true));
        assert!(*done.borrow());

        let snapshot = store.load().unwrap().unwrap();
        assert_eq!(snapshot.reason, SnapshotReason::Completed);
        assert_eq!(snapshot.completed, 2);
        assert!(snapshot.remaining_targets.is_empty());
    }

    #[test]
    fn test_halt_rejects_late_outcomes() {
        let sink = ResultSink::new();
        sink.begin(state(&["a.com", "b.com", "c.com"]));
        sink.accept(1, &outcome("b.com", true));

        let snapshot = sink.halt(SnapshotReason::Cancelled).unwrap();
        assert_eq!(snapshot.remaining_targets, vec!["a.com", "c.com"]);
        assert!(sink.halt(SnapshotReason::Cancelled).is_none());

        assert!(!sink.accept(0, &outcome("a.com", true)));
        assert_eq!(sink.counters().completed, 1);
    }

    #[test]
    fn test_periodic_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let sink = ResultSink::new()
            .with_state_store(store.clone())
            .with_checkpoint_every(2);
        sink.begin(state(&["a.com", "b.com", "c.com", "d.com", "e.com"]));

        sink.accept(0, &outcome("a.com", true));
        assert!(store.load().unwrap().is_none());
        sink.accept(3, &outcome("d.com", false));

        let snapshot = store.load().unwrap().unwrap();
        assert_eq!(snapshot.reason, SnapshotReason::Periodic);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.remaining_targets, vec!["b.com", "c.com", "e.com"]);
    }

    #[test]
    fn test_exporter_receives_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let sink = ResultSink::new().with_exporter(JsonLinesExporter::create(&path).unwrap());
        sink.begin(state(&["a.com", "notadomain"]));

        sink.accept(0, &outcome("a.com", true));
        let invalid = ProbeOutcome::invalid(Normalizer::default().normalize("notadomain"));
        sink.accept(1, &invalid);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let counters = sink.counters();
        assert_eq!(counters.invalid_count, 1);
        assert_eq!(counters.not_working_count, 1);
    }

    #[tokio::test]
    async fn test_channel_progress_sink() {
        let (progress, mut rx) = ChannelProgressSink::channel();
        let sink = ResultSink::new().with_progress(Arc::new(progress));
        sink.begin(state(&["a.com"]));
        sink.accept(0, &outcome("a.com", true));

        match rx.recv().await.unwrap() {
            RunEvent::Outcome { record, counters } => {
                assert_eq!(record.verdict, Verdict::Working);
                assert_eq!(counters.completed, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::Snapshot(_)));
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::Completed(_)));
    }

    #[test]
    fn test_empty_run_finishes_immediately() {
        let sink = ResultSink::new();
        let done = sink.completion();
        sink.begin(RunState::new(Vec::new()));
        assert!(*done.borrow());
        assert!(sink.is_finished());
    }
}
