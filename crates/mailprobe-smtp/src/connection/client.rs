//! Type-state SMTP client.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use base64::Engine;
use tracing::debug;

use super::{Connection, ServerInfo, Socket};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode, Step};

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
///
/// The client borrows its [`Connection`]; closing the connection stays
/// with the owner, whatever state the dialog ended in.
pub struct Client<'c, S, State> {
    conn: &'c Connection<S>,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

impl<S, State> fmt::Debug for Client<'_, S, State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("conn", self.conn)
            .field("server_info", &self.server_info)
            .finish_non_exhaustive()
    }
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S, State> SmtpConnection for Client<'_, S, State> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl<'c, S: Socket> Client<'c, S, Connected> {
    /// Reads the server greeting, which must be `220`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GreetingRejected`] for any other reply, or the
    /// transport error that prevented reading it.
    pub async fn greet(conn: &'c Connection<S>) -> Result<Self> {
        let client = Self {
            conn,
            server_info: ServerInfo::default(),
            _state: PhantomData,
        };

        let greeting = client.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::GreetingRejected {
                code: greeting.code.as_u16(),
                text: greeting.message.join(" "),
            });
        }

        // Hostname is the first word after the code
        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(%hostname, "greeted");

        Ok(Self {
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            ..client
        })
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// A permanent (5xx) rejection falls back to HELO, leaving the
    /// extension set empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandRejected`] if the server accepts neither.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self
            .command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        if reply.is_success() {
            // First line is the server's name, the rest are extensions
            self.server_info.extensions =
                reply.message.iter().skip(1).map(|l| Extension::parse(l)).collect();
            return Ok(self);
        }
        if !reply.is_permanent_error() {
            return Err(rejection(Step::Ehlo, &reply));
        }

        debug!(code = %reply.code, "EHLO rejected, falling back to HELO");
        self.expect(
            Command::Helo {
                hostname: client_hostname.to_string(),
            },
            Step::Helo,
            Reply::is_success,
        )
        .await?;
        self.server_info.extensions.clear();
        Ok(self)
    }

    /// Upgrades the connection with STARTTLS and repeats EHLO.
    ///
    /// `server_name` is verified against the certificate; `client_hostname`
    /// is announced in the new EHLO.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if STARTTLS was not advertised,
    /// [`Error::CommandRejected`] if the server refuses, or the upgrade
    /// error.
    pub async fn starttls(self, server_name: &str, client_hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        self.expect(Command::StartTls, Step::StartTls, Reply::is_success)
            .await?;
        self.conn.upgrade_to_tls(server_name).await?;

        // Capabilities announced before TLS are not trusted
        self.ehlo(client_hostname).await
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] if the password is refused,
    /// or [`Error::CommandRejected`] if an earlier prompt is missing.
    pub async fn auth_login(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<'c, S, Authenticated>> {
        let engine = base64::engine::general_purpose::STANDARD;

        self.expect(
            Command::Auth(AuthMechanism::Login),
            Step::AuthLogin,
            Reply::is_intermediate,
        )
        .await?;
        self.expect(
            Command::AuthResponse(engine.encode(username)),
            Step::AuthUsername,
            Reply::is_intermediate,
        )
        .await?;

        let reply = self
            .command(Command::AuthResponse(engine.encode(password)))
            .await?;
        if !reply.is_success() {
            return Err(Error::AuthenticationFailed {
                code: reply.code.as_u16(),
                text: reply.message.join(" "),
            });
        }

        debug!(username, "authenticated");
        Ok(self.into_state())
    }

    /// Starts a mail transaction without authentication (if server allows).
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(self, from: &Address) -> Result<Client<'c, S, MailTransaction>> {
        self.start_transaction(from).await
    }
}

impl<'c, S: Socket> Client<'c, S, Authenticated> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(self, from: &Address) -> Result<Client<'c, S, MailTransaction>> {
        self.start_transaction(from).await
    }
}

impl<'c, S: Socket> Client<'c, S, MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(self, to: &Address) -> Result<Client<'c, S, RecipientAdded>> {
        self.expect(Command::RcptTo { to: to.clone() }, Step::RcptTo, Reply::is_success)
            .await?;
        Ok(self.into_state())
    }

    /// Sends RCPT TO and returns the reply whatever its code.
    ///
    /// Used to ask whether a mailbox exists without delivering anything.
    ///
    /// # Errors
    ///
    /// Returns transport errors only.
    pub async fn probe_rcpt(&self, to: &Address) -> Result<Reply> {
        self.command(Command::RcptTo { to: to.clone() }).await
    }

    /// Resets the transaction and returns to connected state.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(self) -> Result<Client<'c, S, Connected>> {
        self.expect(Command::Rset, Step::MailFrom, Reply::is_success)
            .await?;
        Ok(self.into_state())
    }
}

impl<'c, S: Socket> Client<'c, S, RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(self, to: &Address) -> Result<Self> {
        self.expect(Command::RcptTo { to: to.clone() }, Step::RcptTo, Reply::is_success)
            .await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers with `3xx`.
    pub async fn data(self) -> Result<Client<'c, S, Data>> {
        self.expect(Command::Data, Step::Data, Reply::is_intermediate)
            .await?;
        Ok(self.into_state())
    }

    /// Resets the transaction and returns to connected state.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(self) -> Result<Client<'c, S, Connected>> {
        self.expect(Command::Rset, Step::RcptTo, Reply::is_success)
            .await?;
        Ok(self.into_state())
    }
}

impl<'c, S: Socket> Client<'c, S, Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to the connection delimiter, lines
    /// starting with `.` are dot-stuffed and the terminating `.` line is
    /// appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandRejected`] if the server does not accept
    /// the message.
    pub async fn send_message(self, message: &str) -> Result<Client<'c, S, Connected>> {
        let payload = encode_data(message, self.conn.config().delimiter.as_str());
        self.conn.write(&payload).await?;

        let reply = self.read_reply().await?;
        if !reply.is_success() {
            return Err(rejection(Step::Message, &reply));
        }
        debug!(reply = %reply.summary(), "message accepted");
        Ok(self.into_state())
    }
}

// Common implementation for all states
impl<'c, S: Socket, State> Client<'c, S, State> {
    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &'c Connection<S> {
        self.conn
    }

    /// Sends QUIT (available in any state).
    ///
    /// The reply is not required to succeed; `None` means the server
    /// closed or did not answer.
    ///
    /// # Errors
    ///
    /// Returns an error only if QUIT could not be written.
    pub async fn quit(self) -> Result<Option<Reply>> {
        let cmd = Command::Quit;
        debug!(command = %cmd.redacted(), "sending");
        self.conn.write(&cmd.to_line()).await?;
        Ok(self.read_reply().await.ok())
    }

    async fn start_transaction(self, from: &Address) -> Result<Client<'c, S, MailTransaction>> {
        self.expect(
            Command::MailFrom { from: from.clone() },
            Step::MailFrom,
            Reply::is_success,
        )
        .await?;
        Ok(self.into_state())
    }

    async fn command(&self, cmd: Command) -> Result<Reply> {
        debug!(command = %cmd.redacted(), "sending");
        self.conn.write(&cmd.to_line()).await?;
        let reply = self.read_reply().await?;
        debug!(reply = %reply.summary(), "received");
        Ok(reply)
    }

    async fn expect(&self, cmd: Command, step: Step, accept: fn(&Reply) -> bool) -> Result<Reply> {
        let reply = self.command(cmd).await?;
        if accept(&reply) {
            Ok(reply)
        } else {
            Err(rejection(step, &reply))
        }
    }

    async fn read_reply(&self) -> Result<Reply> {
        let mut lines = self.conn.read_multi_line(is_last_reply_line).await?;
        lines.retain(|line| !line.is_empty());
        parse_reply(&lines)
    }

    fn into_state<Next>(self) -> Client<'c, S, Next> {
        Client {
            conn: self.conn,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }
}

fn rejection(step: Step, reply: &Reply) -> Error {
    Error::rejected(step, reply.code.as_u16(), reply.message.join(" "))
}

/// Builds the DATA payload: normalized line endings, dot-stuffing and the
/// terminating `.` line. The final delimiter is left to the writer.
fn encode_data(message: &str, delimiter: &str) -> String {
    let mut lines: Vec<&str> = message
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let mut payload = String::with_capacity(message.len() + 16);
    for line in lines {
        if line.starts_with('.') {
            payload.push('.');
        }
        payload.push_str(line);
        payload.push_str(delimiter);
    }
    payload.push('.');
    payload
}
