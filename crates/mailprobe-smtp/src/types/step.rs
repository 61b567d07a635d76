//! Dialog steps, used to name where a conversation failed.

use std::fmt;

/// A step in an SMTP dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Server greeting after connect.
    Greeting,
    /// EHLO
    Ehlo,
    /// HELO (fallback when EHLO is rejected)
    Helo,
    /// STARTTLS command and handshake
    StartTls,
    /// AUTH LOGIN
    AuthLogin,
    /// Base64 username after AUTH LOGIN
    AuthUsername,
    /// Base64 password after AUTH LOGIN
    AuthPassword,
    /// MAIL FROM
    MailFrom,
    /// RCPT TO
    RcptTo,
    /// DATA
    Data,
    /// Message content terminated by `.`
    Message,
    /// QUIT
    Quit,
}

impl Step {
    /// Returns the step name as it appears in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::Helo => "HELO",
            Self::StartTls => "STARTTLS",
            Self::AuthLogin => "AUTH LOGIN",
            Self::AuthUsername => "AUTH username",
            Self::AuthPassword => "AUTH password",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
            Self::Message => "message",
            Self::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
