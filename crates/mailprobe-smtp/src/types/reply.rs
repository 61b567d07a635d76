//! Server replies.

use std::fmt;

/// A complete server reply, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code shared by every line.
    pub code: ReplyCode,
    /// Text of each line, without code and separator.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.class() == 2
    }

    /// 3xx
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code.class() == 3
    }

    /// 4xx
    #[must_use]
    pub const fn is_transient_error(&self) -> bool {
        self.code.class() == 4
    }

    /// 5xx
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code.class() == 5
    }

    /// Returns the reply folded onto one line, as reported to users.
    ///
    /// `250 2.1.5 OK` stays `250 2.1.5 OK`; the lines of a multi-line
    /// reply are joined with spaces after the code.
    #[must_use]
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        for line in self.message.iter().filter(|line| !line.is_empty()) {
            write!(f, " {line}")?;
        }
        Ok(())
    }
}

/// Three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220, sent as greeting.
    pub const SERVICE_READY: Self = Self(220);
    /// 221, answer to QUIT.
    pub const CLOSING: Self = Self(221);
    /// 250, the only code that confirms a recipient.
    pub const OK: Self = Self(250);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the leading digit (2 for `250`).
    #[must_use]
    pub const fn class(self) -> u16 {
        self.0 / 100
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
