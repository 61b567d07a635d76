//! Message submission.
//!
//! ```text
//! CONNECT → 220 → EHLO → [STARTTLS → EHLO] → [AUTH LOGIN] → MAIL FROM
//!         → RCPT TO (each) → DATA → message → QUIT
//! ```
//!
//! Any refusal ends the dialog; the connection is closed without further
//! commands. Once the message is accepted, the outcome of QUIT is only
//! logged.

use std::sync::Arc;
use std::time::Duration;

use mailprobe_smtp::{Address, Client, Config, Connection, Step};
use tracing::{debug, info, warn};

use super::message::OutgoingMessage;
use crate::config::Security;

/// Errors that can occur while sending.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The server refused a step.
    #[error("{step} failed: {reply}")]
    Failed {
        /// Refused step.
        step: Step,
        /// Server reply.
        reply: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Connection failed or was lost.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Invalid address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<mailprobe_smtp::Error> for SendError {
    fn from(err: mailprobe_smtp::Error) -> Self {
        use mailprobe_smtp::Error;

        match err {
            Error::GreetingRejected { code, text } => Self::Failed {
                step: Step::Greeting,
                reply: format!("{code} {text}"),
            },
            Error::CommandRejected {
                step: step @ (Step::AuthLogin | Step::AuthUsername),
                code,
                text,
            } => Self::Authentication(format!("{step} refused: {code} {text}")),
            Error::CommandRejected { step, code, text } => Self::Failed {
                step,
                reply: format!("{code} {text}"),
            },
            Error::AuthenticationFailed { code, text } => {
                Self::Authentication(format!("{code} {text}"))
            }
            Error::InvalidAddress(addr) => Self::InvalidAddress(addr),
            other => Self::Connection(other.to_string()),
        }
    }
}

/// Outgoing server settings.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Server hostname.
    pub host: String,
    /// Server port; derived from the security mode when unset.
    pub port: Option<u16>,
    /// Security mode.
    pub security: Security,
    /// Login name; the sender address when unset.
    pub user: Option<String>,
    /// Password; no authentication when unset.
    pub password: Option<String>,
    /// Per-operation timeout.
    pub timeout: Duration,
    /// TLS client configuration; webpki roots when unset.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl SendOptions {
    /// Creates options for `host` with defaults.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::None,
            user: None,
            password: None,
            timeout: Duration::from_millis(2000),
            tls_config: None,
        }
    }

    fn connection_config(&self) -> Config {
        let mut builder = Config::builder(&self.host)
            .security(self.security.into())
            .crlf()
            .timeout(self.timeout);
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(tls) = &self.tls_config {
            builder = builder.tls_config(Arc::clone(tls));
        }
        builder.build()
    }
}

/// Sends `message` through the server described by `options`.
///
/// # Errors
///
/// Returns [`SendError::Failed`] naming the refused step,
/// [`SendError::Authentication`] if the login is refused,
/// [`SendError::Connection`] on transport failures, or
/// [`SendError::InvalidAddress`] for malformed addresses.
pub async fn send_mail(options: &SendOptions, message: &OutgoingMessage) -> Result<(), SendError> {
    if message.to.is_empty() {
        return Err(SendError::InvalidAddress("No recipients specified".into()));
    }

    let from =
        Address::new(message.from.as_str()).map_err(|e| SendError::InvalidAddress(e.to_string()))?;
    let recipients = message
        .to
        .iter()
        .map(|to| Address::new(to.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SendError::InvalidAddress(e.to_string()))?;

    let conn = Connection::open(options.connection_config()).await?;
    let result = dialog(&conn, options, message, &from, &recipients).await;
    conn.close().await;

    match &result {
        Ok(()) => info!(host = %options.host, recipients = recipients.len(), "message sent"),
        Err(e) => warn!(host = %options.host, error = %e, "send failed"),
    }
    result
}

async fn dialog(
    conn: &Connection,
    options: &SendOptions,
    message: &OutgoingMessage,
    from: &Address,
    recipients: &[Address],
) -> Result<(), SendError> {
    let client_hostname = message.from.replace('@', ".");

    let mut client = Client::greet(conn).await?.ehlo(&client_hostname).await?;
    if options.security == Security::StartTls {
        client = client.starttls(&options.host, &client_hostname).await?;
    }

    let transaction = match &options.password {
        Some(password) => {
            let user = options.user.as_deref().unwrap_or(&message.from);
            client
                .auth_login(user, password)
                .await?
                .mail_from(from)
                .await?
        }
        None => client.mail_from(from).await?,
    };

    let (first, rest) = recipients
        .split_first()
        .ok_or_else(|| SendError::InvalidAddress("No recipients specified".into()))?;
    let mut envelope = transaction.rcpt_to(first).await?;
    for recipient in rest {
        envelope = envelope.rcpt_to(recipient).await?;
    }

    let client = envelope
        .data()
        .await?
        .send_message(&message.to_rfc5322())
        .await?;

    // The message is accepted at this point; QUIT cannot undo that.
    match client.quit().await {
        Ok(Some(reply)) => debug!(reply = %reply.summary(), "session closed"),
        Ok(None) => debug!("no reply to QUIT"),
        Err(e) => debug!(error = %e, "QUIT not sent"),
    }
    Ok(())
}
