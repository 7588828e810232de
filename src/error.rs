//! Error types for dynag-dns.

use thiserror::Error;

/// Errors that can occur while configuring or running the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A configured resource record could not be parsed
    #[error("Invalid record `{record}`: {reason}")]
    Record {
        /// The record text as written in the configuration.
        record: String,
        /// Why it was rejected.
        reason: String,
    },

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

impl DnsError {
    pub(crate) fn record(record: impl Into<String>, reason: impl ToString) -> Self {
        Self::Record {
            record: record.into(),
            reason: reason.to_string(),
        }
    }
}
