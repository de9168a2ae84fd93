use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::types::ProbeOutcome;
use crate::config::ProbeConfig;
use crate::dns::DnsResolver;
use crate::error::Result;
use crate::status::StatusClient;
use crate::validation::NormalizedTarget;

/// The three network signals a probe collects.
///
/// Implementations report failures as errors; the [`Prober`] turns every error
/// (and every timeout) into a negative signal so nothing escapes a probe.
#[async_trait]
pub trait Checks: Send + Sync {
    /// Succeeds when `host` resolves to at least one address.
    async fn resolve(&self, host: &str) -> Result<()>;

    /// Succeeds when a verified TLS handshake with `host:443` completes.
    async fn handshake(&self, host: &str) -> Result<()>;

    /// Returns the final HTTP status code of a GET to `url`.
    async fn fetch_status(&self, url: &str) -> Result<u16>;
}

/// [`Checks`] backed by the real resolver, TLS connector and HTTP client.
#[derive(Debug, Clone)]
pub struct NetworkChecks {
    dns: DnsResolver,
    status: StatusClient,
}

impl NetworkChecks {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        Ok(Self {
            dns: DnsResolver::with_timeout(config.dns_timeout()),
            status: StatusClient::new(config)?,
        })
    }
}

#[async_trait]
impl Checks for NetworkChecks {
    async fn resolve(&self, host: &str) -> Result<()> {
        self.dns.resolve(host).await.map(|_| ())
    }

    async fn handshake(&self, host: &str) -> Result<()> {
        self.status.tls_handshake(host).await
    }

    async fn fetch_status(&self, url: &str) -> Result<u16> {
        self.status.http_status(url).await
    }
}

/// Runs the DNS, TLS and HTTP checks for one target, each under its own timeout.
#[derive(Clone)]
pub struct Prober {
    checks: Arc<dyn Checks>,
    dns_timeout: Duration,
    tls_timeout: Duration,
    http_timeout: Duration,
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("dns_timeout", &self.dns_timeout)
            .field("tls_timeout", &self.tls_timeout)
            .field("http_timeout", &self.http_timeout)
            .finish_non_exhaustive()
    }
}

impl Prober {
    pub fn new(checks: Arc<dyn Checks>, config: &ProbeConfig) -> Self {
        Self {
            checks,
            dns_timeout: config.dns_timeout(),
            tls_timeout: config.tls_timeout(),
            http_timeout: config.http_timeout(),
        }
    }

    /// Probes `target`.
    ///
    /// Implausible targets short-circuit to an invalid outcome without touching
    /// the network. Otherwise the three checks run concurrently and a failure
    /// in one never affects the others.
    #[instrument(skip(self, target), fields(host = %target.host))]
    pub async fn probe(&self, target: NormalizedTarget) -> ProbeOutcome {
        if !target.is_plausible {
            debug!(rejection = ?target.rejection, "Skipping implausible target");
            return ProbeOutcome::invalid(target);
        }

        let start = Instant::now();
        let (dns, tls, http) = tokio::join!(
            bounded("dns", self.dns_timeout, self.checks.resolve(&target.host)),
            bounded("tls", self.tls_timeout, self.checks.handshake(&target.host)),
            bounded(
                "http",
                self.http_timeout,
                self.checks.fetch_status(&target.canonical_url)
            ),
        );
        let duration_ms = start.elapsed().as_millis() as u64;

        ProbeOutcome::checked(target, dns.is_some(), tls.is_some(), http, duration_ms)
    }
}

async fn bounded<T>(
    check: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Option<T> {
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            debug!(check, error = %e, "Sub-check failed");
            None
        }
        Err(_) => {
            debug!(check, timeout_ms = limit.as_millis() as u64, "Sub-check timed out");
            None
        }
    }
}
