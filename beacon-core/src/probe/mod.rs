//! Per-target liveness probe
//!
//! Combines three independent signals into a verdict:
//! - DNS resolution of the host
//! - TLS handshake on port 443
//! - Final HTTP status of the canonical URL

mod prober;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use prober::{Checks, NetworkChecks, Prober};
pub use types::{OutcomeRecord, ProbeOutcome, Verdict};
