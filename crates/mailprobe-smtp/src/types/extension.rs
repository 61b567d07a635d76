//! Capabilities advertised in the EHLO reply.

use std::fmt;

/// One capability line of an EHLO reply.
///
/// Only the capabilities the dialogs act on are decoded; everything else
/// is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `STARTTLS`
    StartTls,
    /// `AUTH` with the mechanisms this client knows.
    Auth(Vec<AuthMechanism>),
    /// `SIZE`, with the limit in bytes when given.
    Size(Option<usize>),
    /// Any other capability line.
    Unknown(String),
}

impl Extension {
    /// Decodes a capability line such as `AUTH LOGIN PLAIN`.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (keyword, params) = line.split_once(' ').unwrap_or((line, ""));

        if keyword.eq_ignore_ascii_case("STARTTLS") {
            Self::StartTls
        } else if keyword.eq_ignore_ascii_case("AUTH") {
            Self::Auth(
                params
                    .split_whitespace()
                    .filter_map(AuthMechanism::parse)
                    .collect(),
            )
        } else if keyword.eq_ignore_ascii_case("SIZE") {
            Self::Size(params.split_whitespace().next().and_then(|n| n.parse().ok()))
        } else {
            Self::Unknown(line.to_string())
        }
    }
}

/// SASL mechanism named in an `AUTH` capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// `PLAIN`
    Plain,
    /// `LOGIN`: base64 username and password, each after a `334` prompt.
    Login,
    /// `CRAM-MD5`
    CramMd5,
}

impl AuthMechanism {
    const ALL: [Self; 3] = [Self::Plain, Self::Login, Self::CramMd5];

    /// Looks up a mechanism by name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mechanism| mechanism.as_str().eq_ignore_ascii_case(name))
    }

    /// Returns the registered mechanism name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
