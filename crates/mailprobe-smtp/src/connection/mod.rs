//! Line-framed connections and the type-state SMTP client built on them.
//!
//! A [`Connection`] owns one socket. A background reader task appends
//! inbound bytes to the [`Correlator`], which frames them into lines and
//! hands each line to the oldest pending read. Every read is guarded by the
//! configured per-operation timeout.
//!
//! ```text
//!  socket ──► reader task ──► Correlator ──► read_line() waiters (FIFO)
//!  write() ─────────────────────────────────► socket
//! ```

mod client;
mod config;
mod correlator;
mod stream;

pub use client::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, SmtpConnection,
};
pub use config::{Config, ConfigBuilder, DEFAULT_TIMEOUT, Delimiter, Security};
pub use correlator::{Correlator, MAX_LINE_LENGTH};
pub use stream::{
    Socket, Transport, create_tls_connector, install_crypto_provider, tls_handshake,
};

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::types::{AuthMechanism, Extension};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 4096;

/// Most lines accepted for one multi-line reply.
pub const MAX_REPLY_LINES: usize = 512;

type Shared = Arc<Mutex<Correlator>>;

fn lock(correlator: &Mutex<Correlator>) -> MutexGuard<'_, Correlator> {
    correlator.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ReaderHandle<S> {
    detach: oneshot::Sender<()>,
    task: JoinHandle<Option<ReadHalf<Transport<S>>>>,
}

/// A line-oriented command/response connection.
///
/// One request may be outstanding at a time; callers serialise
/// `write`/`read_line` pairs. Lines that arrive while no read is pending
/// are kept and returned by the next read.
pub struct Connection<S = TcpStream> {
    config: Config,
    correlator: Shared,
    writer: AsyncMutex<Option<WriteHalf<Transport<S>>>>,
    reader: Mutex<Option<ReaderHandle<S>>>,
    tls: AtomicBool,
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("tls", &self.tls.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Connection<TcpStream> {
    /// Connects to `config.host:config.port`.
    ///
    /// With [`Security::Implicit`] the TLS handshake completes before this
    /// returns. Both steps share the connect timeout; on expiry the
    /// half-open socket is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] on expiry, or the I/O or TLS
    /// error that prevented the connection.
    pub async fn open(config: Config) -> Result<Self> {
        let deadline = config.connect_timeout;
        debug!(host = %config.host, port = config.port, security = ?config.security, "connecting");

        let transport = timeout(deadline, async {
            let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
            tcp.set_nodelay(true)?;
            wrap(tcp, &config).await
        })
        .await
        .map_err(|_| Error::ConnectionTimeout(deadline))??;

        Ok(Self::attach(transport, config))
    }
}

impl<S: Socket> Connection<S> {
    /// Takes over an already connected socket.
    ///
    /// The security mode is honoured as in [`Connection::open`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if an implicit TLS handshake
    /// does not finish in time, or the handshake error.
    pub async fn establish(stream: S, config: Config) -> Result<Self> {
        let deadline = config.connect_timeout;
        let transport = timeout(deadline, wrap(stream, &config))
            .await
            .map_err(|_| Error::ConnectionTimeout(deadline))??;
        Ok(Self::attach(transport, config))
    }

    fn attach(transport: Transport<S>, config: Config) -> Self {
        let tls = transport.is_tls();
        let correlator = Arc::new(Mutex::new(Correlator::new(config.delimiter)));
        let (read, write) = tokio::io::split(transport);
        let reader = spawn_reader(read, Arc::clone(&correlator));

        Self {
            config,
            correlator,
            writer: AsyncMutex::new(Some(write)),
            reader: Mutex::new(Some(reader)),
            tls: AtomicBool::new(tls),
        }
    }

    /// Returns the connection configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true once the connection was closed by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.correlator).is_closed()
    }

    /// Returns true if the transport is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.tls.load(Ordering::Acquire)
    }

    /// Sends one line, appending the configured delimiter.
    ///
    /// A failed or timed out write closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is not open.
    pub async fn write(&self, line: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(Error::ConnectionClosed);
        };

        let delimiter = self.config.delimiter.as_bytes();
        let mut data = Vec::with_capacity(line.len() + delimiter.len());
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(delimiter);

        let deadline = self.config.timeout;
        let result = match timeout(deadline, async {
            writer.write_all(&data).await?;
            writer.flush().await
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout(deadline)),
        };
        drop(guard);

        if let Err(e) = &result {
            warn!(error = %e, "write failed");
            self.close().await;
        } else {
            trace!(bytes = data.len(), "sent");
        }
        result
    }

    /// Returns the next line, without its delimiter.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no line arrives within the timeout. The
    ///   connection is closed unless `close_on_timeout` is off.
    /// - [`Error::ConnectionClosed`] if the connection closes first.
    pub async fn read_line(&self) -> Result<String> {
        let (id, mut slot) = lock(&self.correlator).register();
        let deadline = self.config.timeout;

        match timeout(deadline, &mut slot).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let cancelled = lock(&self.correlator).cancel(id);
                if !cancelled {
                    // Fulfilled between expiry and cancellation.
                    return slot.try_recv().unwrap_or(Err(Error::ConnectionClosed));
                }
                debug!(?deadline, "read timed out");
                if self.config.close_on_timeout {
                    self.close().await;
                }
                Err(Error::Timeout(deadline))
            }
        }
    }

    /// Reads lines until `is_terminal` accepts one; the terminal line is
    /// included in the result.
    ///
    /// # Errors
    ///
    /// Propagates the first failed [`Connection::read_line`]. Returns
    /// [`Error::Protocol`] and closes the connection if no terminal line
    /// arrives within [`MAX_REPLY_LINES`] lines.
    pub async fn read_multi_line<F>(&self, is_terminal: F) -> Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let mut lines = Vec::new();
        while lines.len() < MAX_REPLY_LINES {
            let line = self.read_line().await?;
            let done = is_terminal(&line);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }

        warn!(lines = lines.len(), "multi-line reply never terminated");
        self.close().await;
        Err(Error::Protocol(format!("reply exceeds {MAX_REPLY_LINES} lines")))
    }

    /// Writes a line and waits for the next response line.
    ///
    /// # Errors
    ///
    /// Propagates write and read failures.
    pub async fn request(&self, line: &str) -> Result<String> {
        self.write(line).await?;
        self.read_line().await
    }

    /// Closes the connection.
    ///
    /// Pending reads fail with [`Error::ConnectionClosed`]. Calling this
    /// more than once is a no-op.
    pub async fn close(&self) {
        lock(&self.correlator).close();

        if let Some(reader) = self.take_reader() {
            reader.task.abort();
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = timeout(self.config.timeout, writer.shutdown()).await;
            debug!(host = %self.config.host, "connection closed");
        }
    }

    /// Wraps the open plaintext socket in a TLS session in place.
    ///
    /// The reader task is detached first, so bytes already received stay
    /// in the receive buffer and are delivered after the upgrade. The
    /// handshake runs under the connect timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUpgrade`] if the connection is closed or already
    ///   encrypted.
    /// - The handshake error, or [`Error::ConnectionTimeout`]. The
    ///   connection is closed in both cases.
    pub async fn upgrade_to_tls(&self, server_name: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::InvalidUpgrade("connection is closed".into()));
        }
        if self.is_tls() {
            return Err(Error::InvalidUpgrade("connection is already encrypted".into()));
        }

        let writer = self.writer.lock().await.take();
        let (Some(writer), Some(reader)) = (writer, self.take_reader()) else {
            self.close().await;
            return Err(Error::InvalidUpgrade("transport is not attached".into()));
        };

        let _ = reader.detach.send(());
        let read = match reader.task.await {
            Ok(Some(read)) => read,
            _ => {
                self.close().await;
                return Err(Error::ConnectionClosed);
            }
        };

        let Transport::Plain(socket) = read.unsplit(writer) else {
            self.close().await;
            return Err(Error::InvalidUpgrade("connection is already encrypted".into()));
        };

        let deadline = self.config.connect_timeout;
        let handshake = timeout(
            deadline,
            tls_handshake(socket, server_name, self.config.tls_config.clone()),
        )
        .await;

        let session = match handshake {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(server_name, error = %e, "TLS handshake failed");
                self.close().await;
                return Err(e);
            }
            Err(_) => {
                warn!(server_name, "TLS handshake timed out");
                self.close().await;
                return Err(Error::ConnectionTimeout(deadline));
            }
        };

        let (read, write) = tokio::io::split(Transport::Tls(Box::new(session)));
        *self.writer.lock().await = Some(write);
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(spawn_reader(read, Arc::clone(&self.correlator)));
        self.tls.store(true, Ordering::Release);

        debug!(server_name, "upgraded to TLS");
        Ok(())
    }

    fn take_reader(&self) -> Option<ReaderHandle<S>> {
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

async fn wrap<S: Socket>(stream: S, config: &Config) -> Result<Transport<S>> {
    match config.security {
        Security::Implicit => {
            let session = tls_handshake(stream, &config.host, config.tls_config.clone()).await?;
            Ok(Transport::Tls(Box::new(session)))
        }
        Security::None | Security::StartTls => Ok(Transport::Plain(stream)),
    }
}

fn spawn_reader<S: Socket>(read: ReadHalf<Transport<S>>, correlator: Shared) -> ReaderHandle<S> {
    let (detach, detached) = oneshot::channel();
    let task = tokio::spawn(pump(read, correlator, detached));
    ReaderHandle { detach, task }
}

/// Feeds socket bytes to the correlator until EOF, error, or detach.
///
/// Returns the read half when detached so the socket can be re-wrapped.
async fn pump<S: Socket>(
    mut read: ReadHalf<Transport<S>>,
    correlator: Shared,
    mut detach: oneshot::Receiver<()>,
) -> Option<ReadHalf<Transport<S>>> {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            biased;
            _ = &mut detach => return Some(read),
            received = read.read(&mut chunk) => match received {
                Ok(0) => {
                    trace!("peer closed the connection");
                    lock(&correlator).peer_closed();
                    return None;
                }
                Ok(n) => {
                    trace!(bytes = n, "received");
                    if let Err(e) = lock(&correlator).feed(&chunk[..n]) {
                        warn!(error = %e, "dropping connection");
                        return None;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "read failed");
                    lock(&correlator).fail(Error::Io(e));
                    return None;
                }
            },
        }
    }
}

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, duplex};

    use super::*;

    fn config() -> Config {
        Config::builder("localhost")
            .crlf()
            .timeout(Duration::from_millis(200))
            .build()
    }

    async fn pair(config: Config) -> (Connection<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(4096);
        let conn = Connection::establish(client, config).await.unwrap();
        (conn, server)
    }

    #[tokio::test]
    async fn request_returns_response_line() {
        let (conn, server) = pair(config()).await;
        let mut server = BufReader::new(server);

        let task = tokio::spawn(async move {
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            assert_eq!(line, "NOOP\r\n");
            server.get_mut().write_all(b"250 OK\r\n").await.unwrap();
            server
        });

        assert_eq!(conn.request("NOOP").await.unwrap(), "250 OK");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn lf_delimiter_is_default() {
        let (conn, mut server) = pair(Config::new("localhost", 7)).await;
        server.write_all(b"+OK ready\n").await.unwrap();
        assert_eq!(conn.read_line().await.unwrap(), "+OK ready");
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let (conn, _server) = pair(config()).await;
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        assert!(matches!(conn.write("NOOP").await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn peer_eof_fails_pending_read() {
        let (conn, server) = pair(config()).await;
        drop(server);
        assert!(matches!(conn.read_line().await, Err(Error::ConnectionClosed)));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn multi_line_stops_at_terminal_line() {
        let (conn, mut server) = pair(config()).await;
        server
            .write_all(b"250-first\r\n250-second\r\n250 last\r\n250 next\r\n")
            .await
            .unwrap();

        let lines = conn
            .read_multi_line(crate::parser::is_last_reply_line)
            .await
            .unwrap();
        assert_eq!(lines, vec!["250-first", "250-second", "250 last"]);
        assert_eq!(conn.read_line().await.unwrap(), "250 next");
    }

    #[tokio::test]
    async fn endless_multi_line_reply_is_cut_off() {
        let (conn, mut server) = pair(config()).await;
        let writer = tokio::spawn(async move {
            for _ in 0..=MAX_REPLY_LINES {
                if server.write_all(b"250-more\r\n").await.is_err() {
                    break;
                }
            }
            server
        });

        let result = conn.read_multi_line(crate::parser::is_last_reply_line).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert!(conn.is_closed());
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn upgrade_on_closed_connection_is_invalid() {
        let (conn, _server) = pair(config()).await;
        conn.close().await;
        assert!(matches!(
            conn.upgrade_to_tls("localhost").await,
            Err(Error::InvalidUpgrade(_))
        ));
    }

    #[test]
    fn server_info_capabilities() {
        let mut info = ServerInfo::default();
        info.extensions.insert(Extension::StartTls);
        info.extensions
            .insert(Extension::Auth(vec![AuthMechanism::Login, AuthMechanism::Plain]));
        info.extensions.insert(Extension::Size(Some(1024)));

        assert!(info.supports_starttls());
        assert_eq!(info.max_message_size(), Some(1024));
        assert_eq!(
            info.auth_mechanisms(),
            vec![AuthMechanism::Login, AuthMechanism::Plain]
        );
    }
}
