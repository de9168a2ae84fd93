//! TLS handshake and HTTP status sub-checks
//!
//! Provides the network clients behind two of the three probe signals:
//! - TLS handshake success against port 443 (system trust store, hostname verified)
//! - Final HTTP status code of a GET request, following redirects

mod client;

pub use client::StatusClient;
