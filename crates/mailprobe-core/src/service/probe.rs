//! Mailbox existence probing.
//!
//! The probe runs the start of a mail transaction against each exchanger
//! of the recipient domain and stops at RCPT TO:
//!
//! ```text
//! CONNECT → 220 → EHLO → [STARTTLS → EHLO] → MAIL FROM → RCPT TO → QUIT
//! ```
//!
//! Only the RCPT reply decides. `250` means the mailbox exists, any `5xx`
//! means it does not, and everything else (greylisting, timeouts, refused
//! connections) moves on to the next strategy or exchanger.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mailprobe_smtp::{Address, Client, Config, Connection, Reply, ReplyCode, SmtpConnection, Step};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::resolver::MxResolver;

/// Reason given when no exchanger gave a definitive answer.
pub const INDETERMINATE: &str = "indeterminate";

/// Reason given when the domain has no usable exchanger.
pub const NO_EXCHANGER: &str = "no mail exchanger available";

/// How to reach an exchanger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Plaintext on the SMTP port, upgraded with STARTTLS when advertised.
    StartTls,
    /// TLS from the start on the submissions port.
    Implicit,
    /// Plaintext on the SMTP port, never upgraded.
    Plain,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StartTls => "starttls",
            Self::Implicit => "implicit",
            Self::Plain => "plain",
        })
    }
}

/// Outcome of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The server decided: the mailbox exists or it does not.
    Definitive(bool),
    /// No decision; another strategy or exchanger may answer.
    Transient,
    /// The server refused the dialog before RCPT TO.
    Fatal {
        /// Step that was refused.
        step: Step,
        /// Server reply.
        text: String,
    },
}

impl Verdict {
    /// Returns the existence answer if the verdict is definitive.
    #[must_use]
    pub const fn exists(&self) -> Option<bool> {
        match self {
            Self::Definitive(exists) => Some(*exists),
            Self::Transient | Self::Fatal { .. } => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definitive(true) => f.write_str("exists"),
            Self::Definitive(false) => f.write_str("does not exist"),
            Self::Transient => f.write_str("transient"),
            Self::Fatal { step, text } => write!(f, "refused at {step}: {text}"),
        }
    }
}

/// Classifies the reply to RCPT TO.
#[must_use]
pub fn classify(reply: &Reply) -> Verdict {
    if reply.code == ReplyCode::OK {
        Verdict::Definitive(true)
    } else if reply.is_permanent_error() {
        Verdict::Definitive(false)
    } else {
        Verdict::Transient
    }
}

/// Classifies a failure before RCPT TO.
#[must_use]
pub fn classify_error(err: &mailprobe_smtp::Error) -> Verdict {
    match (err.step(), err.is_permanent()) {
        (Some(step), true) => Verdict::Fatal {
            step,
            text: err.to_string(),
        },
        _ => Verdict::Transient,
    }
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Envelope sender used in MAIL FROM.
    pub sender: String,
    /// Name announced in EHLO/HELO.
    pub helo_name: String,
    /// Per-operation timeout, also used for connect.
    pub timeout: Duration,
    /// Strategies tried in order on every exchanger.
    pub strategies: Vec<Strategy>,
    /// Port for the plaintext strategies.
    pub smtp_port: u16,
    /// Port for the implicit TLS strategy.
    pub smtps_port: u16,
    /// TLS client configuration; webpki roots when unset.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            sender: "postmaster@localhost".into(),
            helo_name: "localhost".into(),
            timeout: Duration::from_millis(1800),
            strategies: vec![Strategy::StartTls, Strategy::Implicit, Strategy::Plain],
            smtp_port: 25,
            smtps_port: 465,
            tls_config: None,
        }
    }
}

impl ProbeOptions {
    fn connection_config(&self, host: &str, strategy: Strategy) -> Config {
        let (security, port) = match strategy {
            Strategy::StartTls => (mailprobe_smtp::Security::StartTls, self.smtp_port),
            Strategy::Implicit => (mailprobe_smtp::Security::Implicit, self.smtps_port),
            Strategy::Plain => (mailprobe_smtp::Security::None, self.smtp_port),
        };
        let builder = Config::builder(host)
            .security(security)
            .port(port)
            .crlf()
            .timeout(self.timeout);
        match &self.tls_config {
            Some(tls) => builder.tls_config(Arc::clone(tls)).build(),
            None => builder.build(),
        }
    }
}

/// One probe attempt against one exchanger.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    /// Exchanger hostname.
    pub host: String,
    /// Connection strategy.
    pub strategy: Strategy,
    /// Classified outcome.
    #[serde(serialize_with = "display")]
    pub verdict: Verdict,
    /// RCPT reply or error message.
    pub detail: String,
}

fn display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Result of a mailbox check.
#[derive(Debug, Clone, Serialize)]
pub struct MailboxCheck {
    /// Checked address.
    pub email: String,
    /// `Some` when an exchanger answered definitively.
    pub exists: Option<bool>,
    /// The deciding server reply, or why there is no answer.
    pub reason: String,
    /// Every attempt made, in order.
    pub attempts: Vec<Attempt>,
}

impl MailboxCheck {
    fn undecided(email: &str, reason: &str, attempts: Vec<Attempt>) -> Self {
        Self {
            email: email.to_string(),
            exists: None,
            reason: reason.to_string(),
            attempts,
        }
    }
}

/// Checks whether `email` exists by asking the exchangers of its domain.
///
/// Resolution failures and empty MX lists give an undecided result rather
/// than an error.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if `email` is not a mailbox address.
pub async fn check_mailbox<R: MxResolver>(
    resolver: &R,
    email: &str,
    options: &ProbeOptions,
) -> Result<MailboxCheck> {
    let address = parse_address(email)?;

    let records = match resolver.resolve_mx(address.domain()).await {
        Ok(records) => records,
        Err(e) => {
            warn!(domain = address.domain(), error = %e, "MX lookup failed");
            Vec::new()
        }
    };
    if records.is_empty() {
        info!(email, "{NO_EXCHANGER}");
        return Ok(MailboxCheck::undecided(email, NO_EXCHANGER, Vec::new()));
    }

    let hosts: Vec<String> = records.into_iter().map(|record| record.exchange).collect();
    probe_mailbox(&hosts, email, options).await
}

/// Probes `hosts` in order until one answers definitively.
///
/// Each host is tried with every strategy in `options.strategies`. A
/// plaintext attempt is skipped when the STARTTLS attempt on the same host
/// ran without upgrading, since the dialog would be identical. A refusal
/// before RCPT TO is recorded and the next strategy is tried, as another
/// port may be served by a different listener.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if `email` is not a mailbox address.
pub async fn probe_mailbox(
    hosts: &[String],
    email: &str,
    options: &ProbeOptions,
) -> Result<MailboxCheck> {
    let recipient = parse_address(email)?;
    let sender = Address::new(options.sender.as_str())
        .map_err(|e| Error::Config(format!("invalid probe sender: {e}")))?;

    let mut attempts = Vec::new();
    for host in hosts {
        let mut plain_covered = false;

        for &strategy in &options.strategies {
            if strategy == Strategy::Plain && plain_covered {
                debug!(%host, "plaintext dialog already tried");
                continue;
            }

            let outcome = attempt(host, strategy, &sender, &recipient, options).await;
            if strategy == Strategy::StartTls && !outcome.tls_attempted {
                plain_covered = true;
            }
            debug!(%host, %strategy, verdict = %outcome.verdict, detail = %outcome.detail, "probe attempt");

            let verdict = outcome.verdict.clone();
            attempts.push(Attempt {
                host: host.clone(),
                strategy,
                verdict: outcome.verdict,
                detail: outcome.detail.clone(),
            });

            match verdict {
                Verdict::Definitive(exists) => {
                    info!(email, exists, reply = %outcome.detail, "mailbox checked");
                    return Ok(MailboxCheck {
                        email: email.to_string(),
                        exists: Some(exists),
                        reason: outcome.detail,
                        attempts,
                    });
                }
                Verdict::Fatal { .. } | Verdict::Transient => {}
            }
        }
    }

    info!(email, attempts = attempts.len(), "{INDETERMINATE}");
    Ok(MailboxCheck::undecided(email, INDETERMINATE, attempts))
}

fn parse_address(email: &str) -> Result<Address> {
    Address::new(email).map_err(|e| Error::InvalidAddress(format!("{email}: {e}")))
}

struct Outcome {
    verdict: Verdict,
    detail: String,
    tls_attempted: bool,
}

async fn attempt(
    host: &str,
    strategy: Strategy,
    sender: &Address,
    recipient: &Address,
    options: &ProbeOptions,
) -> Outcome {
    let conn = match Connection::open(options.connection_config(host, strategy)).await {
        Ok(conn) => conn,
        Err(e) => {
            return Outcome {
                verdict: classify_error(&e),
                detail: e.to_string(),
                tls_attempted: false,
            };
        }
    };

    let mut tls_attempted = false;
    let result = dialog(&conn, host, strategy, sender, recipient, options, &mut tls_attempted).await;
    conn.close().await;

    let (verdict, detail) = match result {
        Ok(reply) => (classify(&reply), reply.summary()),
        Err(e) => (classify_error(&e), e.to_string()),
    };
    Outcome {
        verdict,
        detail,
        tls_attempted,
    }
}

async fn dialog(
    conn: &Connection,
    host: &str,
    strategy: Strategy,
    sender: &Address,
    recipient: &Address,
    options: &ProbeOptions,
    tls_attempted: &mut bool,
) -> mailprobe_smtp::Result<Reply> {
    let mut client = Client::greet(conn).await?.ehlo(&options.helo_name).await?;

    if strategy == Strategy::StartTls && client.server_info().supports_starttls() {
        *tls_attempted = true;
        client = client.starttls(host, &options.helo_name).await?;
    }

    let transaction = client.mail_from(sender).await?;
    let reply = transaction.probe_rcpt(recipient).await?;
    let _ = transaction.quit().await;
    Ok(reply)
}
