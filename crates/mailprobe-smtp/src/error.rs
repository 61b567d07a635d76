//! Error types for transport and SMTP operations.

use std::io;
use std::time::Duration;

use crate::types::Step;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport and SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The connection could not be established within the deadline.
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// A pending read was not fulfilled within the deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The transport was closed, or closed while a read was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server greeting was not `220`.
    #[error("Greeting rejected: {code} {text}")]
    GreetingRejected {
        /// Reply code (e.g., 554).
        code: u16,
        /// Reply text from server.
        text: String,
    },

    /// The server answered a command with an unexpected reply.
    #[error("{step} rejected: {code} {text}")]
    CommandRejected {
        /// Dialog step that failed.
        step: Step,
        /// Reply code (e.g., 550).
        code: u16,
        /// Reply text from server.
        text: String,
    },

    /// STARTTLS attempted on a closed or already encrypted transport.
    #[error("Invalid TLS upgrade: {0}")]
    InvalidUpgrade(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {code} {text}")]
    AuthenticationFailed {
        /// Reply code (e.g., 535).
        code: u16,
        /// Reply text from server.
        text: String,
    },

    /// Protocol error (malformed reply).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A line exceeded the maximum length without a delimiter.
    #[error("Line too long: more than {0} bytes without delimiter")]
    LineTooLong(usize),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Creates a command rejection from a step, reply code and text.
    #[must_use]
    pub fn rejected(step: Step, code: u16, text: impl Into<String>) -> Self {
        Self::CommandRejected {
            step,
            code,
            text: text.into(),
        }
    }

    /// Returns the reply code carried by this error, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::GreetingRejected { code, .. }
            | Self::CommandRejected { code, .. }
            | Self::AuthenticationFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the dialog step that failed, if known.
    #[must_use]
    pub const fn step(&self) -> Option<Step> {
        match self {
            Self::GreetingRejected { .. } => Some(Step::Greeting),
            Self::CommandRejected { step, .. } => Some(*step),
            Self::AuthenticationFailed { .. } => Some(Step::AuthPassword),
            _ => None,
        }
    }

    /// Returns true for connect or read deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout(_) | Self::Timeout(_))
    }

    /// Returns true if the server gave a permanent (5xx) rejection.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.reply_code(), Some(code) if code >= 500 && code < 600)
    }

    /// Returns true if the server gave a transient (4xx) rejection.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.reply_code(), Some(code) if code >= 400 && code < 500)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejection_carries_step_and_code() {
        let err = Error::rejected(Step::MailFrom, 550, "sender blocked");
        assert_eq!(err.step(), Some(Step::MailFrom));
        assert_eq!(err.reply_code(), Some(550));
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "MAIL FROM rejected: 550 sender blocked");
    }

    #[test]
    fn timeouts() {
        assert!(Error::Timeout(Duration::from_millis(10)).is_timeout());
        assert!(Error::ConnectionTimeout(Duration::from_millis(10)).is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
    }

    #[test]
    fn auth_failure_is_password_step() {
        let err = Error::AuthenticationFailed {
            code: 535,
            text: "bad credentials".into(),
        };
        assert_eq!(err.step(), Some(Step::AuthPassword));
        assert!(err.is_permanent());
    }

    #[test]
    fn greylisting_is_transient() {
        let err = Error::rejected(Step::RcptTo, 450, "try later");
        assert!(err.is_transient());
        assert_eq!(Error::ConnectionClosed.reply_code(), None);
    }
}
