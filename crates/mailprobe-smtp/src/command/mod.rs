//! Client commands.

use std::fmt;

use crate::types::{Address, AuthMechanism};

/// A command line sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HELO`, used when EHLO is refused
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// `EHLO`
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// `STARTTLS`
    StartTls,
    /// `AUTH` without initial response
    Auth(AuthMechanism),
    /// Base64 answer to a `334` authentication prompt
    AuthResponse(String),
    /// `MAIL FROM`
    MailFrom {
        /// Envelope sender
        from: Address,
    },
    /// `RCPT TO`
    RcptTo {
        /// Envelope recipient
        to: Address,
    },
    /// `DATA`
    Data,
    /// `RSET`
    Rset,
    /// `QUIT`
    Quit,
}

impl Command {
    /// Renders the command as a single line, without delimiter.
    ///
    /// The transport appends the line delimiter on write.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::Auth(mechanism) => format!("AUTH {mechanism}"),
            Self::AuthResponse(response) => response.clone(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::StartTls | Self::Data | Self::Rset | Self::Quit => self.to_string(),
        }
    }

    /// Renders the command for logs, hiding credentials.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::AuthResponse(_) => "<credentials>".to_string(),
            _ => self.to_line(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth(_) | Self::AuthResponse(_) => "AUTH",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        })
    }
}
