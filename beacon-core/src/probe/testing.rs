//! In-memory [`Checks`] used by unit tests across the crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::Checks;
use crate::error::{BeaconError, Result};

pub(crate) struct StubChecks {
    tls_ok: bool,
    http_code: u16,
    delay: Duration,
    failing_hosts: HashSet<String>,
    dns_calls: AtomicUsize,
    tls_calls: AtomicUsize,
    http_calls: AtomicUsize,
    last_url: Mutex<Option<String>>,
}

impl StubChecks {
    pub(crate) fn healthy() -> Self {
        Self {
            tls_ok: true,
            http_code: 200,
            delay: Duration::ZERO,
            failing_hosts: HashSet::new(),
            dns_calls: AtomicUsize::new(0),
            tls_calls: AtomicUsize::new(0),
            http_calls: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        }
    }

    pub(crate) fn with_tls_failure(mut self) -> Self {
        self.tls_ok = false;
        self
    }

    pub(crate) fn with_http_code(mut self, code: u16) -> Self {
        self.http_code = code;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hosts listed here fail DNS resolution.
    pub(crate) fn with_failing_hosts<I: IntoIterator<Item = String>>(mut self, hosts: I) -> Self {
        self.failing_hosts = hosts.into_iter().collect();
        self
    }

    pub(crate) fn dns_calls(&self) -> usize {
        self.dns_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.dns_calls.load(Ordering::SeqCst)
            + self.tls_calls.load(Ordering::SeqCst)
            + self.http_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl Checks for StubChecks {
    async fn resolve(&self, host: &str) -> Result<()> {
        self.dns_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.failing_hosts.contains(host) {
            Err(BeaconError::DnsError(format!("{} does not resolve", host)))
        } else {
            Ok(())
        }
    }

    async fn handshake(&self, host: &str) -> Result<()> {
        self.tls_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.tls_ok {
            Ok(())
        } else {
            Err(BeaconError::TlsError(format!("handshake with {} refused", host)))
        }
    }

    async fn fetch_status(&self, url: &str) -> Result<u16> {
        self.http_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap() = Some(url.to_string());
        self.pause().await;
        Ok(self.http_code)
    }
}
