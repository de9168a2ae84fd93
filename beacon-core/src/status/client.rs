use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::config::ProbeConfig;
use crate::error::{BeaconError, Result};

/// Client for the TLS and HTTP sub-checks.
///
/// The HTTP client and TLS connector are built once and shared by every
/// worker; both are cheap to clone.
#[derive(Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    tls: tokio_native_tls::TlsConnector,
    tls_timeout: Duration,
}

impl fmt::Debug for StatusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusClient")
            .field("http", &self.http)
            .field("tls_timeout", &self.tls_timeout)
            .finish_non_exhaustive()
    }
}

impl StatusClient {
    /// Builds the clients from the probe configuration.
    ///
    /// Fails only if the platform TLS backend cannot be initialized.
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .redirect(reqwest::redirect::Policy::limited(config.redirect_limit))
            .user_agent(config.user_agent.as_str())
            .build()?;

        // Default verification: system trust store and hostname check.
        let tls = native_tls::TlsConnector::new().map_err(|e| BeaconError::TlsError(e.to_string()))?;

        Ok(Self {
            http,
            tls: tokio_native_tls::TlsConnector::from(tls),
            tls_timeout: config.tls_timeout(),
        })
    }

    /// Opens a TCP connection to `host:443` and completes a TLS handshake.
    ///
    /// The connect and the handshake share one timeout budget.
    #[instrument(skip(self), fields(host = %host))]
    pub async fn tls_handshake(&self, host: &str) -> Result<()> {
        let handshake = async {
            let addr = format!("{}:443", host);
            let stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| BeaconError::TlsError(format!("connect to {} failed: {}", addr, e)))?;
            self.tls
                .connect(host, stream)
                .await
                .map_err(|e| BeaconError::TlsError(e.to_string()))
        };

        let _stream = timeout(self.tls_timeout, handshake)
            .await
            .map_err(|_| BeaconError::Timeout(format!("TLS handshake with {} timed out", host)))??;

        debug!("TLS handshake completed");
        Ok(())
    }

    /// Issues a GET to `url`, following redirects, and returns the final status code.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn http_status(&self, url: &str) -> Result<u16> {
        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();
        debug!(status, final_url = %response.url(), "HTTP request completed");
        Ok(status)
    }
}
