//! Connection configuration types.

use std::sync::Arc;
use std::time::Duration;

/// Default per-operation timeout of the command client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1800);

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 25).
    #[default]
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 587).
    StartTls,
    /// TLS from the start (port 465).
    Implicit,
}

impl Security {
    /// Returns the default SMTP port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Implicit => 465,
        }
    }
}

/// Line delimiter used to frame requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// `\n`, for generic command protocols.
    #[default]
    Lf,
    /// `\r\n`, mandatory for SMTP.
    CrLf,
}

impl Delimiter {
    /// Returns the delimiter bytes.
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }

    /// Returns the delimiter as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname, also used as TLS server name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Line delimiter.
    pub delimiter: Delimiter,
    /// Deadline for each read and write.
    pub timeout: Duration,
    /// Deadline for TCP connect and TLS handshakes.
    pub connect_timeout: Duration,
    /// Close the connection when a read times out.
    pub close_on_timeout: bool,
    /// TLS client configuration; webpki roots when unset.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl Config {
    /// Creates a plaintext, `\n`-delimited configuration with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::None,
            delimiter: Delimiter::Lf,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            close_on_timeout: true,
            tls_config: None,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    delimiter: Delimiter,
    timeout: Duration,
    connect_timeout: Option<Duration>,
    close_on_timeout: bool,
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::None,
            delimiter: Delimiter::Lf,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: None,
            close_on_timeout: true,
            tls_config: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Uses `\r\n` as line delimiter.
    #[must_use]
    pub const fn crlf(mut self) -> Self {
        self.delimiter = Delimiter::CrLf;
        self
    }

    /// Sets the line delimiter.
    #[must_use]
    pub const fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout; defaults to the per-operation timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Keeps the connection open after a read timeout.
    #[must_use]
    pub const fn close_on_timeout(mut self, close: bool) -> Self {
        self.close_on_timeout = close;
        self
    }

    /// Sets a custom TLS client configuration.
    #[must_use]
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            delimiter: self.delimiter,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout.unwrap_or(self.timeout),
            close_on_timeout: self.close_on_timeout,
            tls_config: self.tls_config,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 25);
        assert_eq!(Security::StartTls.default_port(), 587);
        assert_eq!(Security::Implicit.default_port(), 465);
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("mx.example.com", 25);
        assert_eq!(config.host, "mx.example.com");
        assert_eq!(config.port, 25);
        assert_eq!(config.security, Security::None);
        assert_eq!(config.delimiter, Delimiter::Lf);
        assert_eq!(config.timeout, Duration::from_millis(1800));
        assert!(config.close_on_timeout);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("smtp.example.com")
            .security(Security::Implicit)
            .crlf()
            .timeout(Duration::from_secs(2))
            .connect_timeout(Duration::from_secs(10))
            .close_on_timeout(false)
            .build();

        assert_eq!(config.port, 465);
        assert_eq!(config.delimiter, Delimiter::CrLf);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(!config.close_on_timeout);
    }

    #[test]
    fn test_connect_timeout_follows_timeout() {
        let config = Config::builder("smtp.example.com")
            .timeout(Duration::from_secs(3))
            .build();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.port, 25);
    }

    #[test]
    fn test_delimiter_bytes() {
        assert_eq!(Delimiter::Lf.as_bytes(), b"\n");
        assert_eq!(Delimiter::CrLf.as_bytes(), b"\r\n");
        assert_eq!(Delimiter::CrLf.as_str(), "\r\n");
    }
}
