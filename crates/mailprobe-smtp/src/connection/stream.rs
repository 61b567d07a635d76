//! Plaintext/TLS stream abstraction.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::error::Result;

/// Sockets a [`Connection`](super::Connection) can own.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Socket for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// A socket that is either plaintext or wrapped in a TLS session.
#[derive(Debug)]
pub enum Transport<S> {
    /// Plaintext socket.
    Plain(S),
    /// TLS session over the socket (boxed to reduce enum size).
    Tls(Box<TlsStream<S>>),
}

impl<S> Transport<S> {
    /// Returns true if the transport is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for Transport<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for Transport<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

static CRYPTO_PROVIDER: Once = Once::new();

/// Installs aws-lc-rs as the process-wide rustls crypto provider.
///
/// Other crates in the process may enable a second provider, in which case
/// rustls refuses to pick one on its own. Safe to call repeatedly; an
/// already installed provider is kept.
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Creates a TLS connector, using webpki root certificates unless a
/// configuration is supplied.
#[must_use]
pub fn create_tls_connector(config: Option<Arc<ClientConfig>>) -> TlsConnector {
    let config = config.unwrap_or_else(|| {
        install_crypto_provider();
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        )
    });

    TlsConnector::from(config)
}

/// Runs a TLS client handshake over an existing socket.
///
/// # Errors
///
/// Returns an error if the hostname is not a valid server name or the
/// handshake fails.
pub async fn tls_handshake<S>(
    stream: S,
    host: &str,
    config: Option<Arc<ClientConfig>>,
) -> Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connector = create_tls_connector(config);
    let server_name = ServerName::try_from(host.to_string())?;
    Ok(connector.connect(server_name, stream).await?)
}
