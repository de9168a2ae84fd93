use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validation::NormalizedTarget;

/// Final classification of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Working,
    NotWorking,
    Invalid,
}

impl Verdict {
    /// Classifies a plausible target from its three signals.
    ///
    /// Working requires DNS, TLS and an HTTP status below 400.
    pub fn from_signals(dns_ok: bool, tls_ok: bool, http_code: Option<u16>) -> Self {
        match http_code {
            Some(code) if dns_ok && tls_ok && code < 400 => Verdict::Working,
            _ => Verdict::NotWorking,
        }
    }

    pub fn is_working(self) -> bool {
        self == Verdict::Working
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Working => write!(f, "WORKING"),
            Verdict::NotWorking => write!(f, "NOT WORKING"),
            Verdict::Invalid => write!(f, "INVALID"),
        }
    }
}

/// Result of checking one target. Created once, consumed once by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub target: NormalizedTarget,
    pub dns_ok: bool,
    pub tls_ok: bool,
    pub http_code: Option<u16>,
    pub verdict: Verdict,
    /// Wall time spent on the network checks
    pub duration_ms: u64,
}

impl ProbeOutcome {
    /// Outcome for a target that failed local filtering; no checks were run.
    pub fn invalid(target: NormalizedTarget) -> Self {
        Self {
            target,
            dns_ok: false,
            tls_ok: false,
            http_code: None,
            verdict: Verdict::Invalid,
            duration_ms: 0,
        }
    }

    pub fn checked(
        target: NormalizedTarget,
        dns_ok: bool,
        tls_ok: bool,
        http_code: Option<u16>,
        duration_ms: u64,
    ) -> Self {
        let verdict = if target.is_plausible {
            Verdict::from_signals(dns_ok, tls_ok, http_code)
        } else {
            Verdict::Invalid
        };
        Self {
            target,
            dns_ok,
            tls_ok,
            http_code,
            verdict,
            duration_ms,
        }
    }

    pub fn record(&self) -> OutcomeRecord {
        OutcomeRecord::from(self)
    }
}

/// Flat per-target record handed to exporters and progress subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub raw_input: String,
    pub canonical_url: String,
    pub host: String,
    pub dns_ok: bool,
    pub tls_ok: bool,
    pub http_code: Option<u16>,
    pub verdict: Verdict,
    pub duration_ms: u64,
}

impl From<&ProbeOutcome> for OutcomeRecord {
    fn from(outcome: &ProbeOutcome) -> Self {
        Self {
            raw_input: outcome.target.raw_input.clone(),
            canonical_url: outcome.target.canonical_url.clone(),
            host: outcome.target.host.clone(),
            dns_ok: outcome.dns_ok,
            tls_ok: outcome.tls_ok,
            http_code: outcome.http_code,
            verdict: outcome.verdict,
            duration_ms: outcome.duration_ms,
        }
    }
}
