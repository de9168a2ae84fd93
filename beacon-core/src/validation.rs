//! Target normalization and local plausibility filtering.
//!
//! Everything in this module is pure: no network I/O, no clock, no globals.
//! A raw input line becomes a [`NormalizedTarget`] carrying the canonical
//! `https://` URL, the bare host used by the DNS and TLS checks, and whether
//! the line is worth spending network round-trips on.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ProbeConfig;

/// A raw input line after canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedTarget {
    /// The input line, trimmed
    pub raw_input: String,
    /// `https://` URL rebuilt from the input (scheme and `www.` stripped)
    pub canonical_url: String,
    /// Lower-case host without port, path, query or fragment
    pub host: String,
    /// False when a local check already rules the target out
    pub is_plausible: bool,
    /// Why the target was ruled out, when it was
    pub rejection: Option<Rejection>,
}

/// Reason a target failed the local plausibility checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Rejection {
    /// The input has no `.` at all
    MissingDot,
    /// The path-like suffix is a file extension (image, document, archive)
    FileExtension(String),
    /// The host contains an empty or syntactically invalid label
    MalformedHost,
    /// The last label of the host is not in the allow-list
    UnlistedTld(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingDot => write!(f, "no dot in input"),
            Rejection::FileExtension(ext) => write!(f, "file extension .{}", ext),
            Rejection::MalformedHost => write!(f, "malformed host"),
            Rejection::UnlistedTld(tld) => write!(f, "top-level domain .{} not allowed", tld),
        }
    }
}

/// Applies the configured allow-list and extension block-list to raw lines.
#[derive(Debug, Clone)]
pub struct Normalizer {
    tld_allow_list: BTreeSet<String>,
    blocked_extensions: BTreeSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}

impl Normalizer {
    pub fn new(tld_allow_list: BTreeSet<String>, blocked_extensions: BTreeSet<String>) -> Self {
        Self {
            tld_allow_list,
            blocked_extensions,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            config.tld_allow_list.clone(),
            config.blocked_extensions.clone(),
        )
    }

    /// Normalize one raw input line.
    ///
    /// This function:
    /// - Trims surrounding whitespace
    /// - Removes an `http://` or `https://` scheme and a `www.` prefix (any case)
    /// - Removes trailing slashes
    /// - Rebuilds the canonical `https://` URL with a lower-case host
    /// - Marks the target implausible when it has no dot, ends in a blocked
    ///   file extension, has a malformed host, or uses an unlisted TLD
    pub fn normalize(&self, raw: &str) -> NormalizedTarget {
        let trimmed = raw.trim();
        let rest = strip_www(strip_scheme(trimmed)).trim_end_matches('/');

        let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, path) = rest.split_at(authority_len);
        let authority = authority.to_ascii_lowercase();
        let host = strip_port(&authority).to_string();
        let canonical_url = format!("https://{}{}", authority, path);

        let rejection = self.rejection_for(trimmed, rest, &host);

        NormalizedTarget {
            raw_input: trimmed.to_string(),
            canonical_url,
            host,
            is_plausible: rejection.is_none(),
            rejection,
        }
    }

    fn rejection_for(&self, trimmed: &str, rest: &str, host: &str) -> Option<Rejection> {
        if !trimmed.contains('.') {
            return Some(Rejection::MissingDot);
        }

        // Only the path-like part counts; a query string may legitimately end in ".png".
        let path_like = rest
            .split(['?', '#'])
            .next()
            .unwrap_or(rest)
            .to_ascii_lowercase();
        if let Some((_, ext)) = path_like.rsplit_once('.') {
            if self.blocked_extensions.contains(ext) {
                return Some(Rejection::FileExtension(ext.to_string()));
            }
        }

        if !is_well_formed_host(host) {
            return Some(Rejection::MalformedHost);
        }

        let tld = host.rsplit('.').next().unwrap_or(host);
        if !self.tld_allow_list.contains(tld) {
            return Some(Rejection::UnlistedTld(tld.to_string()));
        }

        None
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn strip_scheme(s: &str) -> &str {
    strip_prefix_ignore_case(s, "https://")
        .or_else(|| strip_prefix_ignore_case(s, "http://"))
        .unwrap_or(s)
}

/// `www.` is only a prefix when a dotted host remains (`www.com` is a host).
fn strip_www(s: &str) -> &str {
    match strip_prefix_ignore_case(s, "www.") {
        Some(rest) => {
            let host_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
            if rest[..host_len].contains('.') {
                rest
            } else {
                s
            }
        }
        None => s,
    }
}

fn strip_port(authority: &str) -> &str {
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

fn is_well_formed_host(host: &str) -> bool {
    if host.is_empty() || !host.contains('.') {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
