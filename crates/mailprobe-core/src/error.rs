//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP or transport failure.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailprobe_smtp::Error),

    /// HTTP request to a DNS-over-HTTPS endpoint failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// DNS lookup returned an error status or no usable answer.
    #[error("DNS error: {0}")]
    Dns(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The address has no usable mailbox or domain part.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
