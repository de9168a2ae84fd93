//! Host resolution for the DNS sub-check.

mod resolver;

pub use resolver::DnsResolver;
