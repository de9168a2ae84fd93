use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::sink::ResultSink;
use super::state::{RunCounters, RunState, Snapshot, SnapshotReason};
use crate::config::ProbeConfig;
use crate::error::Result;
use crate::probe::{Checks, NetworkChecks, ProbeOutcome, Prober};
use crate::validation::Normalizer;

/// Shared run signal observed by every worker between targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Running,
    Paused,
    Stopped,
}

type WorkQueue = Arc<Mutex<VecDeque<(usize, String)>>>;

fn lock_queue(queue: &WorkQueue) -> MutexGuard<'_, VecDeque<(usize, String)>> {
    match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Work queue lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Final tally returned by [`Run::wait`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(flatten)]
    pub counters: RunCounters,
    pub cancelled: bool,
    /// Targets not reported when the run ended
    pub remaining: usize,
    pub elapsed_ms: u64,
}

/// Bounded worker pool that probes a list of targets.
#[derive(Debug, Clone)]
pub struct BulkExecutor {
    config: ProbeConfig,
    normalizer: Arc<Normalizer>,
    prober: Prober,
}

impl BulkExecutor {
    /// Executor backed by real DNS, TLS and HTTP checks.
    pub fn new(config: ProbeConfig) -> Result<Self> {
        config.validate()?;
        let checks = NetworkChecks::new(&config)?;
        Self::with_checks(config, Arc::new(checks))
    }

    pub fn with_checks(config: ProbeConfig, checks: Arc<dyn Checks>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: Arc::new(Normalizer::from_config(&config)),
            prober: Prober::new(checks, &config),
            config,
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Starts a fresh run over `targets`. Must be called inside a Tokio runtime.
    pub fn start(&self, targets: Vec<String>, sink: ResultSink) -> Run {
        self.launch(RunState::new(targets), sink)
    }

    /// Continues a run from a snapshot. The snapshot's counters are the
    /// baseline and its remaining targets are probed again.
    pub fn resume(&self, snapshot: Snapshot, sink: ResultSink) -> Result<Run> {
        let state = RunState::from_snapshot(snapshot)?;
        Ok(self.launch(state, sink))
    }

    fn launch(&self, state: RunState, sink: ResultSink) -> Run {
        let queue: VecDeque<(usize, String)> =
            state.targets().iter().cloned().enumerate().collect();
        let pending = queue.len();
        let counters = state.counters();

        sink.begin(state);
        let sink = Arc::new(sink);
        let queue: WorkQueue = Arc::new(Mutex::new(queue));
        let (signal_tx, signal_rx) = watch::channel(RunSignal::Running);

        let worker_count = self.config.worker_count.min(pending);
        info!(
            total = counters.total,
            pending,
            workers = worker_count,
            "Starting bulk run"
        );

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                queue: queue.clone(),
                normalizer: self.normalizer.clone(),
                prober: self.prober.clone(),
                sink: sink.clone(),
                signal: signal_rx.clone(),
            };
            workers.spawn(worker.run());
        }

        Run {
            control: RunControl {
                signal: Arc::new(signal_tx),
                sink: sink.clone(),
                queue,
            },
            workers,
            sink,
            started: Instant::now(),
        }
    }
}

struct Worker {
    id: usize,
    queue: WorkQueue,
    normalizer: Arc<Normalizer>,
    prober: Prober,
    sink: Arc<ResultSink>,
    signal: watch::Receiver<RunSignal>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let next = lock_queue(&self.queue).pop_front();
            let Some((index, raw)) = next else {
                break;
            };
            let target = self.normalizer.normalize(&raw);

            if !wait_until_runnable(&mut self.signal).await {
                break;
            }

            let outcome = if target.is_plausible {
                tokio::select! {
                    outcome = self.prober.probe(target) => outcome,
                    _ = stopped(&mut self.signal) => {
                        debug!(worker = self.id, input = %raw, "Abandoning in-flight probe");
                        break;
                    }
                }
            } else {
                ProbeOutcome::invalid(target)
            };

            // Exporters and checkpoints fsync; keep that off the async workers.
            let sink = self.sink.clone();
            let accepted = tokio::task::spawn_blocking(move || sink.accept(index, &outcome)).await;
            if let Err(e) = accepted {
                error!(worker = self.id, input = %raw, error = %e, "Result sink task failed");
            }
        }
        debug!(worker = self.id, "Worker exiting");
    }
}

/// Waits while paused. Returns false once the run is stopped.
async fn wait_until_runnable(signal: &mut watch::Receiver<RunSignal>) -> bool {
    loop {
        let current = *signal.borrow_and_update();
        match current {
            RunSignal::Running => return true,
            RunSignal::Stopped => return false,
            RunSignal::Paused => {}
        }
        if signal.changed().await.is_err() {
            return false;
        }
    }
}

/// Resolves when the run is stopped; never resolves otherwise.
async fn stopped(signal: &mut watch::Receiver<RunSignal>) {
    loop {
        if *signal.borrow_and_update() == RunSignal::Stopped {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Pause, resume and cancel for a running [`Run`]. Every operation is
/// idempotent and returns whether it changed anything.
#[derive(Debug, Clone)]
pub struct RunControl {
    signal: Arc<watch::Sender<RunSignal>>,
    sink: Arc<ResultSink>,
    queue: WorkQueue,
}

impl RunControl {
    pub fn signal(&self) -> RunSignal {
        *self.signal.borrow()
    }

    pub fn pause(&self) -> bool {
        if self.sink.is_finished() {
            return false;
        }
        let changed = self.signal.send_if_modified(|signal| {
            if *signal == RunSignal::Running {
                *signal = RunSignal::Paused;
                true
            } else {
                false
            }
        });
        if changed {
            self.sink.mark_paused(true);
            self.sink.snapshot(SnapshotReason::Paused);
            info!("Run paused");
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let changed = self.signal.send_if_modified(|signal| {
            if *signal == RunSignal::Paused {
                *signal = RunSignal::Running;
                true
            } else {
                false
            }
        });
        if changed {
            self.sink.mark_paused(false);
            info!("Run resumed");
        }
        changed
    }

    /// Stops the run and records the unreported targets in a `CANCELLED` snapshot.
    pub fn cancel(&self) -> bool {
        self.stop(SnapshotReason::Cancelled)
    }

    /// Like [`cancel`](Self::cancel), tagged `FORCE_EXIT`.
    pub fn force_exit(&self) -> bool {
        self.stop(SnapshotReason::ForceExit)
    }

    /// Like [`cancel`](Self::cancel), tagged `INTERRUPTED`.
    pub fn interrupt(&self) -> bool {
        self.stop(SnapshotReason::Interrupted)
    }

    fn stop(&self, reason: SnapshotReason) -> bool {
        // The sink refuses outcomes from here on, so the snapshot it takes
        // is exactly the unreported set.
        if self.sink.halt(reason).is_none() {
            return false;
        }
        self.signal.send_replace(RunSignal::Stopped);
        let dropped = {
            let mut queue = lock_queue(&self.queue);
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        debug!(reason = %reason, dropped, "Work queue cleared");
        true
    }
}

/// Handle to a started run.
pub struct Run {
    control: RunControl,
    workers: JoinSet<()>,
    sink: Arc<ResultSink>,
    started: Instant,
}

impl Run {
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn sink(&self) -> &Arc<ResultSink> {
        &self.sink
    }

    /// Waits for every worker to exit and returns the final tally.
    pub async fn wait(mut self) -> RunSummary {
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }

        let counters = self.sink.counters();
        let remaining = self.sink.remaining_targets().len();
        let summary = RunSummary {
            counters,
            cancelled: self.sink.is_stopped(),
            remaining,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        };
        debug!(
            completed = counters.completed,
            total = counters.total,
            remaining,
            elapsed_ms = summary.elapsed_ms,
            "Bulk run finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::StateStore;
    use crate::probe::testing::StubChecks;
    use rand::Rng;
    use std::time::Duration;

    fn config(workers: usize) -> ProbeConfig {
        ProbeConfig::default()
            .with_worker_count(workers)
            .with_checkpoint_every(0)
    }

    fn hosts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("host{}.com", i)).collect()
    }

    async fn wait_for_completed(sink: &ResultSink, n: usize) {
        for _ in 0..400 {
            if sink.counters().completed >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {} outcomes", n);
    }

    #[tokio::test]
    async fn test_every_target_reported_once() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let n = rng.gen_range(0..60);
            let k = rng.gen_range(1..10);
            let mut targets = Vec::new();
            let mut failing = Vec::new();
            let mut expected_working = 0;
            for i in 0..n {
                match rng.gen_range(0..3) {
                    0 => targets.push(format!("nodot{}", i)),
                    1 => {
                        let host = format!("down{}.com", i);
                        failing.push(host.clone());
                        targets.push(host);
                    }
                    _ => {
                        expected_working += 1;
                        targets.push(format!("up{}.com", i));
                    }
                }
            }

            let checks = Arc::new(StubChecks::healthy().with_failing_hosts(failing));
            let executor = BulkExecutor::with_checks(config(k), checks).unwrap();
            let summary = executor.start(targets, ResultSink::new()).wait().await;

            let counters = summary.counters;
            assert_eq!(counters.total, n);
            assert_eq!(counters.completed, n);
            assert_eq!(counters.working_count + counters.not_working_count, n);
            assert_eq!(counters.working_count, expected_working);
            assert_eq!(summary.remaining, 0);
            assert!(!summary.cancelled);
        }
    }

    #[tokio::test]
    async fn test_invalid_targets_skip_network() {
        let checks = Arc::new(StubChecks::healthy());
        let executor = BulkExecutor::with_checks(config(4), checks.clone()).unwrap();
        let targets = vec!["example.com", "notadomain", "bad.png", "github.io"]
            .into_iter()
            .map(String::from)
            .collect();
        let summary = executor.start(targets, ResultSink::new()).wait().await;

        assert_eq!(summary.counters.completed, 4);
        assert_eq!(summary.counters.invalid_count, 2);
        assert_eq!(checks.dns_calls(), 2);
        assert_eq!(checks.total_calls(), 6);
    }

    #[tokio::test]
    async fn test_empty_run_completes() {
        let executor =
            BulkExecutor::with_checks(config(8), Arc::new(StubChecks::healthy())).unwrap();
        let sink = ResultSink::new();
        let done = sink.completion();
        let summary = executor.start(Vec::new(), sink).wait().await;
        assert_eq!(summary.counters.total, 0);
        assert!(*done.borrow());
    }

    #[tokio::test]
    async fn test_pause_stops_new_work_until_resume() {
        let delay = Duration::from_millis(20);
        let checks = Arc::new(StubChecks::healthy().with_delay(delay));
        let executor = BulkExecutor::with_checks(config(2), checks).unwrap();
        let run = executor.start(hosts(30), ResultSink::new());
        let control = run.control();
        let sink = run.sink().clone();

        wait_for_completed(&sink, 2).await;
        assert!(control.pause());
        assert!(!control.pause());
        assert_eq!(control.signal(), RunSignal::Paused);
        assert!(sink.is_paused());

        // In-flight probes may still land; after that nothing new starts.
        tokio::time::sleep(delay * 3).await;
        let settled = sink.counters().completed;
        tokio::time::sleep(delay * 5).await;
        assert_eq!(sink.counters().completed, settled);
        assert!(settled < 30);

        assert!(control.resume());
        assert!(!control.resume());
        let summary = run.wait().await;
        assert_eq!(summary.counters.completed, 30);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_cancel_records_unreported_targets() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let checks = Arc::new(StubChecks::healthy().with_delay(Duration::from_millis(15)));
        let executor = BulkExecutor::with_checks(config(3), checks).unwrap();
        let run = executor.start(hosts(40), ResultSink::new().with_state_store(store.clone()));
        let control = run.control();
        let sink = run.sink().clone();

        wait_for_completed(&sink, 3).await;
        assert!(control.cancel());
        assert!(!control.cancel());
        assert_eq!(control.signal(), RunSignal::Stopped);

        let snapshot = store.load().unwrap().unwrap();
        assert_eq!(snapshot.reason, SnapshotReason::Cancelled);
        assert_eq!(snapshot.remaining_targets, sink.remaining_targets());
        assert_eq!(
            snapshot.completed + snapshot.remaining_targets.len(),
            snapshot.total
        );

        let at_cancel = sink.counters();
        let summary = run.wait().await;
        assert!(summary.cancelled);
        assert_eq!(summary.counters, at_cancel);
        assert_eq!(summary.remaining, snapshot.remaining_targets.len());
        assert!(!control.resume());
    }

    #[tokio::test]
    async fn test_cancel_while_paused_keeps_held_targets() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let delay = Duration::from_millis(20);
        let checks = Arc::new(StubChecks::healthy().with_delay(delay));
        let executor = BulkExecutor::with_checks(config(3), checks).unwrap();
        let run = executor.start(hosts(12), ResultSink::new().with_state_store(store.clone()));
        let control = run.control();
        let sink = run.sink().clone();

        wait_for_completed(&sink, 3).await;
        assert!(control.pause());
        tokio::time::sleep(delay * 4).await;

        // Parked workers each hold a dequeued target that is still unreported.
        let settled = sink.counters().completed;
        let queued = lock_queue(&control.queue).len();
        assert!(settled < 12);
        assert!(settled + queued < 12);

        assert!(control.cancel());
        let snapshot = store.load().unwrap().unwrap();
        assert_eq!(snapshot.reason, SnapshotReason::Cancelled);
        assert_eq!(snapshot.completed, settled);
        assert_eq!(snapshot.remaining_targets.len(), 12 - settled);
        assert_eq!(snapshot.remaining_targets, sink.remaining_targets());
        assert!(snapshot.verify().is_ok());

        let summary = run.wait().await;
        assert!(summary.cancelled);
        assert_eq!(summary.counters.completed, settled);
        assert_eq!(summary.remaining, 12 - settled);
    }

    struct SlowExporter(Duration);

    impl crate::output::Exporter for SlowExporter {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn export(&mut self, _record: &crate::probe::OutcomeRecord) -> Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blocking_exporter_does_not_stall_runtime() {
        let checks = Arc::new(StubChecks::healthy());
        let executor = BulkExecutor::with_checks(config(1), checks).unwrap();
        let sink = ResultSink::new().with_exporter(SlowExporter(Duration::from_millis(100)));
        let run = executor.start(hosts(3), sink);

        let ticker = tokio::spawn(async {
            let mut last = std::time::Instant::now();
            let mut widest = Duration::ZERO;
            for _ in 0..40 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                widest = widest.max(last.elapsed());
                last = std::time::Instant::now();
            }
            widest
        });

        let summary = run.wait().await;
        assert_eq!(summary.counters.completed, 3);
        let widest = ticker.await.unwrap();
        assert!(widest < Duration::from_millis(80), "runtime stalled for {:?}", widest);
    }

    #[tokio::test]
    async fn test_resume_finishes_cancelled_run() {
        let checks = Arc::new(StubChecks::healthy().with_delay(Duration::from_millis(10)));
        let executor = BulkExecutor::with_checks(config(2), checks.clone()).unwrap();
        let run = executor.start(hosts(20), ResultSink::new());
        let control = run.control();
        let sink = run.sink().clone();

        wait_for_completed(&sink, 4).await;
        control.cancel();
        run.wait().await;
        let snapshot = sink.snapshot(SnapshotReason::Cancelled);
        let before = snapshot.completed;
        assert!(before < 20);

        let resumed = BulkExecutor::with_checks(config(4), checks)
            .unwrap()
            .resume(snapshot, ResultSink::new())
            .unwrap();
        let summary = resumed.wait().await;
        assert_eq!(summary.counters.total, 20);
        assert_eq!(summary.counters.completed, 20);
        assert_eq!(summary.counters.working_count, 20);
    }

    #[tokio::test]
    async fn test_controls_are_noops_after_completion() {
        let executor =
            BulkExecutor::with_checks(config(2), Arc::new(StubChecks::healthy())).unwrap();
        let run = executor.start(hosts(3), ResultSink::new());
        let control = run.control();
        let summary = run.wait().await;

        assert_eq!(summary.counters.completed, 3);
        assert!(!control.cancel());
        assert!(!control.pause());
        assert_eq!(control.signal(), RunSignal::Running);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result =
            BulkExecutor::with_checks(config(0), Arc::new(StubChecks::healthy()));
        assert!(result.is_err());
    }
}
