//! Envelope addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A mailbox address as used in `MAIL FROM` and `RCPT TO`.
///
/// Only the envelope shape is checked: one `@` with text on both sides
/// and nothing that could break out of the `<...>` brackets or the
/// command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates and wraps an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is malformed.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let problem = if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            Some("contains forbidden characters")
        } else {
            match addr.split_once('@') {
                None => Some("missing @"),
                Some((_, domain)) if domain.contains('@') => Some("more than one @"),
                Some(("", _)) => Some("empty local part"),
                Some((_, "")) => Some("empty domain"),
                Some(_) => None,
            }
        };

        match problem {
            Some(reason) => Err(Error::InvalidAddress(format!("{addr:?}: {reason}"))),
            None => Ok(Self(addr)),
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the part before `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split_once('@').map_or("", |(local, _)| local)
    }

    /// Returns the part after `@`, the domain whose exchangers receive mail.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let addr: Address = "jane.doe@mail.example.com".parse().unwrap();
        assert_eq!(addr.local_part(), "jane.doe");
        assert_eq!(addr.domain(), "mail.example.com");
        assert_eq!(addr.to_string(), "jane.doe@mail.example.com");
    }

    #[test]
    fn test_rejected_shapes() {
        for addr in ["", "jane", "@example.com", "jane@", "a@b@c", "jane doe@example.com"] {
            assert!(
                matches!(Address::new(addr), Err(Error::InvalidAddress(_))),
                "{addr:?} accepted"
            );
        }
    }

    #[test]
    fn test_command_injection_rejected() {
        assert!(Address::new("jane@example.com>\r\nRCPT TO:<x@y").is_err());
        assert!(Address::new("jane@example.com\nDATA").is_err());
    }
}
