//! Persistent settings.
//!
//! Settings live in `<config_dir>/mailprobe/settings.json`. A missing file
//! yields the defaults; every field is optional in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resolver::DEFAULT_ENDPOINTS;
use crate::service::probe::{ProbeOptions, Strategy};

/// Security/encryption mode for outgoing connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption.
    #[default]
    None,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
    /// Implicit TLS (connect directly with TLS).
    Tls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::StartTls => "STARTTLS",
            Self::Tls => "SSL/TLS",
        }
    }
}

impl From<Security> for mailprobe_smtp::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::StartTls => Self::StartTls,
            Security::Tls => Self::Implicit,
        }
    }
}

/// Mailbox probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Envelope sender used in MAIL FROM.
    pub sender: String,
    /// Name announced in EHLO/HELO.
    pub helo_name: String,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connection strategies, tried in order on every exchanger.
    pub strategies: Vec<Strategy>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        let options = ProbeOptions::default();
        Self {
            sender: options.sender,
            helo_name: options.helo_name,
            timeout_ms: u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
            strategies: options.strategies,
        }
    }
}

/// MX resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// DNS-over-HTTPS JSON endpoints, used in rotation.
    pub endpoints: Vec<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Outgoing SMTP server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Server hostname.
    pub host: Option<String>,
    /// Server port (default: 25, 587 for STARTTLS, 465 for TLS).
    pub port: Option<u16>,
    /// Security mode.
    pub security: Security,
    /// Default sender address.
    pub from: Option<String>,
    /// Login name; the sender address when unset.
    pub user: Option<String>,
}

/// Application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Mailbox probe settings.
    pub probe: ProbeSettings,
    /// MX resolution settings.
    pub resolver: ResolverSettings,
    /// Outgoing SMTP server settings.
    pub smtp: SmtpSettings,
}

impl Settings {
    /// Returns the default settings file location.
    #[must_use]
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailprobe")
            .join("settings.json")
    }

    /// Loads settings from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::path()).await
    }

    /// Loads settings from `path`, falling back to defaults if it does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        tracing::info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Builds probe options from these settings.
    #[must_use]
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            sender: self.probe.sender.clone(),
            helo_name: self.probe.helo_name.clone(),
            timeout: Duration::from_millis(self.probe.timeout_ms),
            strategies: self.probe.strategies.clone(),
            ..ProbeOptions::default()
        }
    }
}
