//! Error types for replica-dns.

use thiserror::Error;

/// Errors that can occur in the DNS responder.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (socket bind, send, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS wire-format error from the codec.
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// HTTP client construction error.
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Configuration could not be loaded.
    #[error("Configuration load error: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Query decoded but not something this responder answers.
    #[error("Malformed query: {0}")]
    Malformed(String),
}
