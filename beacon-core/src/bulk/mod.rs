//! Bulk probing: the worker pool, the result sink and resumable run state.

mod executor;
mod input;
mod sink;
mod state;

pub use executor::{BulkExecutor, Run, RunControl, RunSignal, RunSummary};
pub use input::{load_targets, parse_targets, TargetList};
pub use sink::{ChannelProgressSink, ProgressSink, ResultSink, RunEvent};
pub use state::{RunCounters, RunState, Snapshot, SnapshotReason, StateStore};
