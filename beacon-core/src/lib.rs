pub mod bulk;
pub mod colors;
pub mod config;
pub mod dns;
pub mod error;
pub mod output;
pub mod probe;
pub mod status;
pub mod validation;

pub use error::{BeaconError, Result};
pub use validation::{NormalizedTarget, Normalizer, Rejection};

pub use config::ProbeConfig;
pub use dns::DnsResolver;
pub use probe::{Checks, NetworkChecks, OutcomeRecord, ProbeOutcome, Prober, Verdict};
pub use status::StatusClient;

pub use bulk::{
    BulkExecutor, ChannelProgressSink, ProgressSink, ResultSink, Run, RunControl, RunCounters,
    RunEvent, RunSummary, Snapshot, SnapshotReason, StateStore,
};
pub use output::{Exporter, OutputFormat, OutputFormatter};
