//! Probe engine configuration.
//!
//! A single `ProbeConfig` is built by the caller (defaults, a TOML file, or
//! both) and handed to the executor at construction. Nothing here is global.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BeaconError, Result};

/// Default number of parallel workers.
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Top-level domains accepted when no allow-list is configured.
pub const DEFAULT_TLDS: &[&str] = &[
    "com", "net", "org", "in", "us", "uk", "de", "fr", "cn", "jp", "io", "gov", "edu", "biz",
    "info", "aero", "nl", "me",
];

/// Path suffixes that mark a line as a file reference rather than a website.
pub const DEFAULT_BLOCKED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "html", "htm", "pdf", "zip", "rar",
    "7z", "gz", "tar", "txt", "csv", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "mp3", "mp4",
];

const DEFAULT_USER_AGENT: &str = concat!(
    "beacon/",
    env!("CARGO_PKG_VERSION"),
    " (bulk website liveness checker)"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Number of workers draining the target queue
    pub worker_count: usize,
    /// Timeout for the DNS sub-check in milliseconds
    pub dns_timeout_ms: u64,
    /// Timeout for the TCP connect + TLS handshake sub-check in milliseconds
    pub tls_timeout_ms: u64,
    /// Timeout for the whole HTTP request (including redirects) in milliseconds
    pub http_timeout_ms: u64,
    /// Accepted top-level domains, lower-case without the leading dot
    pub tld_allow_list: BTreeSet<String>,
    /// Rejected path suffixes, lower-case without the leading dot
    pub blocked_extensions: BTreeSet<String>,
    /// User-Agent header sent with the HTTP check
    pub user_agent: String,
    /// Maximum number of redirects followed by the HTTP check
    pub redirect_limit: usize,
    /// Write a periodic snapshot every N accepted outcomes (0 disables)
    pub checkpoint_every: usize,
    /// Drop repeated targets (same canonical URL) when loading input
    pub dedupe: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            dns_timeout_ms: 5_000,
            tls_timeout_ms: 5_000,
            http_timeout_ms: 8_000,
            tld_allow_list: DEFAULT_TLDS.iter().map(|s| s.to_string()).collect(),
            blocked_extensions: DEFAULT_BLOCKED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            redirect_limit: 10,
            checkpoint_every: 50,
            dedupe: true,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BeaconError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded probe configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: ProbeConfig = toml::from_str(content)?;
        config.tld_allow_list = normalize_set(config.tld_allow_list);
        config.blocked_extensions = normalize_set(config.blocked_extensions);
        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    pub fn with_timeouts(mut self, dns: Duration, tls: Duration, http: Duration) -> Self {
        self.dns_timeout_ms = dns.as_millis() as u64;
        self.tls_timeout_ms = tls.as_millis() as u64;
        self.http_timeout_ms = http.as_millis() as u64;
        self
    }

    pub fn with_tld_allow_list<I, S>(mut self, tlds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tld_allow_list = normalize_set(tlds.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every;
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn tls_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(BeaconError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.dns_timeout_ms == 0 || self.tls_timeout_ms == 0 || self.http_timeout_ms == 0 {
            return Err(BeaconError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.tld_allow_list.is_empty() {
            return Err(BeaconError::Config(
                "tld_allow_list must not be empty".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(BeaconError::Config("user_agent must not be empty".to_string()));
        }
        Ok(())
    }
}

fn normalize_set(values: BTreeSet<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().trim_start_matches('.').to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}
