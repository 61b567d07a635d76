//! STARTTLS against an in-process TLS server with a self-signed certificate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio_rustls::TlsAcceptor;

use mailprobe_smtp::connection::install_crypto_provider;
use mailprobe_smtp::{Client, Config, Connection, Error, SmtpConnection};

/// Server acceptor and a client configuration trusting its certificate.
fn certificates() -> (TlsAcceptor, Arc<ClientConfig>) {
    install_crypto_provider();

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let server = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.clone()], key)
        .unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(cert).unwrap();
    let client = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    (TlsAcceptor::from(Arc::new(server)), Arc::new(client))
}

async fn connect(client_tls: Arc<ClientConfig>) -> (Connection<DuplexStream>, DuplexStream) {
    let (client, server) = duplex(64 * 1024);
    let config = Config::builder("localhost")
        .crlf()
        .timeout(Duration::from_secs(2))
        .tls_config(client_tls)
        .build();
    (Connection::establish(client, config).await.unwrap(), server)
}

async fn next_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end_matches("\r\n").to_string()
}

#[tokio::test]
async fn upgrade_preserves_buffered_bytes() {
    let (acceptor, client_tls) = certificates();
    let (conn, mut server) = connect(client_tls).await;

    let script = tokio::spawn(async move {
        // Both lines land in the receive buffer before the upgrade.
        server
            .write_all(b"220 ready\r\n250 pipelined\r\n")
            .await
            .unwrap();

        let mut tls = BufReader::new(acceptor.accept(server).await.unwrap());
        let line = next_line(&mut tls).await;
        tls.get_mut().write_all(b"250 secure\r\n").await.unwrap();
        tls.get_mut().flush().await.unwrap();
        line
    });

    assert_eq!(conn.read_line().await.unwrap(), "220 ready");
    conn.upgrade_to_tls("localhost").await.unwrap();
    assert!(conn.is_tls());

    assert_eq!(conn.read_line().await.unwrap(), "250 pipelined");
    assert_eq!(conn.request("NOOP").await.unwrap(), "250 secure");
    assert_eq!(script.await.unwrap(), "NOOP");
}

#[tokio::test]
async fn second_upgrade_is_invalid() {
    let (acceptor, client_tls) = certificates();
    let (conn, server) = connect(client_tls).await;

    let script = tokio::spawn(async move {
        let mut tls = acceptor.accept(server).await.unwrap();
        tls.write_all(b"220 ready\r\n").await.unwrap();
        tls.flush().await.unwrap();
        tls
    });

    conn.upgrade_to_tls("localhost").await.unwrap();
    let err = conn.upgrade_to_tls("localhost").await.unwrap_err();
    assert!(matches!(err, Error::InvalidUpgrade(_)));

    // Still usable after the rejected attempt.
    assert!(!conn.is_closed());
    assert_eq!(conn.read_line().await.unwrap(), "220 ready");
    let _tls = script.await.unwrap();
}

#[tokio::test]
async fn failed_handshake_closes_connection() {
    let (acceptor, _) = certificates();
    // Default client configuration does not trust the self-signed certificate.
    let (client, server) = duplex(64 * 1024);
    let config = Config::builder("localhost")
        .crlf()
        .timeout(Duration::from_secs(2))
        .build();
    let conn = Connection::establish(client, config).await.unwrap();

    let script = tokio::spawn(async move { acceptor.accept(server).await.is_err() });

    let err = conn.upgrade_to_tls("localhost").await.unwrap_err();
    assert!(matches!(err, Error::Io(_) | Error::Tls(_)));
    assert!(conn.is_closed());
    assert!(matches!(conn.read_line().await, Err(Error::ConnectionClosed)));
    assert!(script.await.unwrap());
}

#[tokio::test]
async fn client_starttls_repeats_ehlo() {
    let (acceptor, client_tls) = certificates();
    let (conn, server) = connect(client_tls).await;

    let script = tokio::spawn(async move {
        let mut plain = BufReader::new(server);
        plain.get_mut().write_all(b"220 mx ESMTP\r\n").await.unwrap();

        let ehlo = next_line(&mut plain).await;
        plain
            .get_mut()
            .write_all(b"250-mx\r\n250 STARTTLS\r\n")
            .await
            .unwrap();
        let starttls = next_line(&mut plain).await;
        plain.get_mut().write_all(b"220 go ahead\r\n").await.unwrap();

        let mut tls = BufReader::new(acceptor.accept(plain.into_inner()).await.unwrap());
        let secure_ehlo = next_line(&mut tls).await;
        tls.get_mut()
            .write_all(b"250-mx\r\n250 AUTH LOGIN\r\n")
            .await
            .unwrap();
        tls.get_mut().flush().await.unwrap();

        vec![ehlo, starttls, secure_ehlo]
    });

    let client = Client::greet(&conn)
        .await
        .unwrap()
        .ehlo("client.test")
        .await
        .unwrap()
        .starttls("localhost", "client.test")
        .await
        .unwrap();

    assert!(conn.is_tls());
    assert!(!client.server_info().supports_starttls());
    assert_eq!(client.server_info().auth_mechanisms().len(), 1);
    assert_eq!(
        script.await.unwrap(),
        vec!["EHLO client.test", "STARTTLS", "EHLO client.test"]
    );
}
