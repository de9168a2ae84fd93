use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("failed to read input file {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    #[error("DNS resolution failed: {0}")]
    DnsError(String),

    #[error("DNS resolver error: {0}")]
    DnsResolverError(#[from] hickory_resolver::error::ResolveError),

    #[error("TLS handshake failed: {0}")]
    TlsError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("inconsistent run state: {0}")]
    InconsistentState(String),
}

impl BeaconError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BeaconError::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BeaconError>;
