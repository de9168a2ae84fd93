use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, instrument, warn};

use crate::error::{BeaconError, Result};

/// Host resolver used by the DNS sub-check.
///
/// Uses the system resolver configuration, falling back to Google DNS (8.8.8.8)
/// when `/etc/resolv.conf` (or the platform equivalent) cannot be read.
#[derive(Clone)]
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DnsResolver {
    /// Creates a resolver whose individual queries give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let (config, mut opts) = match read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!(error = %e, "Could not read system resolver config, using Google DNS");
                (ResolverConfig::google(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves `host` to its A/AAAA addresses.
    ///
    /// An answer with no addresses is reported as an error so callers can treat
    /// `Ok` as "the name resolves".
    #[instrument(skip(self), fields(host = %host))]
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let response = self.resolver.lookup_ip(host).await?;
        let addrs: Vec<IpAddr> = response.iter().collect();

        if addrs.is_empty() {
            return Err(BeaconError::DnsError(format!("{} has no address records", host)));
        }

        debug!(count = addrs.len(), "Resolved host");
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolver_keeps_timeout() {
        let resolver = DnsResolver::with_timeout(Duration::from_millis(1500));
        assert_eq!(resolver.timeout(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_reserved_name_does_not_resolve() {
        // RFC 2606 reserves .invalid; no resolver may answer it.
        let resolver = DnsResolver::with_timeout(Duration::from_secs(2));
        assert!(resolver.resolve("beacon-test.invalid").await.is_err());
    }
}
