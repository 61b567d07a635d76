//! Scripted SMTP server on a local port.
//!
//! Each session answers the greeting, then replies to commands in script
//! order. `QUIT` is always answered with `221` and ends the session. A
//! session marked with [`Session::hang_up`] closes the socket right after
//! its last scripted reply.
//! Message content after a `354` reply is collected until the `.` line.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// One scripted connection.
#[derive(Debug, Clone)]
pub struct Session {
    greeting: &'static str,
    script: Vec<(&'static str, &'static str)>,
    hang_up: bool,
}

impl Session {
    /// Starts a session with the given greeting reply.
    pub fn greeting(greeting: &'static str) -> Self {
        Self {
            greeting,
            script: Vec::new(),
            hang_up: false,
        }
    }

    /// Replies `reply` to the next command, which must start with `command`.
    pub fn then(mut self, command: &'static str, reply: &'static str) -> Self {
        self.script.push((command, reply));
        self
    }

    /// Closes the connection after the last scripted reply.
    pub fn hang_up(mut self) -> Self {
        self.hang_up = true;
        self
    }
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// A running mock server.
pub struct MockServer {
    /// Port the server listens on.
    pub port: u16,
    handle: JoinHandle<Vec<Vec<String>>>,
}

impl MockServer {
    /// Serves `sessions` one after another.
    pub async fn start(sessions: Vec<Session>) -> Self {
        Self::start_with_tls(sessions, None).await
    }

    /// Serves `sessions`, upgrading to TLS after a `220` reply to STARTTLS.
    pub async fn start_with_tls(sessions: Vec<Session>, acceptor: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut transcripts = Vec::new();
            for session in sessions {
                let (socket, _) = listener.accept().await.unwrap();
                transcripts.push(run(Box::new(socket), session, acceptor.clone()).await);
            }
            transcripts
        });

        Self { port, handle }
    }

    /// Waits for every session and returns the commands received in each.
    pub async fn transcripts(self) -> Vec<Vec<String>> {
        self.handle.await.unwrap()
    }
}

async fn run(socket: Box<dyn Io>, session: Session, acceptor: Option<TlsAcceptor>) -> Vec<String> {
    let mut stream = BufReader::new(socket);
    let mut received = Vec::new();
    let hang_up = session.hang_up;
    let mut script = session.script.into_iter();
    let mut in_data = false;

    stream
        .get_mut()
        .write_all(format!("{}\r\n", session.greeting).as_bytes())
        .await
        .unwrap();

    loop {
        let mut raw = Vec::new();
        match stream.read_until(b'\n', &mut raw).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string();

        if in_data {
            if line == "." {
                in_data = false;
                received.push(line.clone());
            } else {
                received.push(format!("> {line}"));
                continue;
            }
        } else {
            received.push(line.clone());
        }

        if line == "QUIT" {
            let _ = stream.get_mut().write_all(b"221 Bye\r\n").await;
            break;
        }

        let reply = match script.next() {
            Some((expected, reply)) if line.starts_with(expected) => reply.to_string(),
            Some((expected, _)) => format!("500 expected {expected}"),
            None => "503 out of script".to_string(),
        };
        let writer = stream.get_mut();
        if writer.write_all(format!("{reply}\r\n").as_bytes()).await.is_err()
            || writer.flush().await.is_err()
        {
            break;
        }

        if hang_up && script.len() == 0 {
            let _ = stream.get_mut().shutdown().await;
            break;
        }
        if reply.starts_with("354") {
            in_data = true;
        }
        if line == "STARTTLS" && reply.starts_with("220") {
            if let Some(acceptor) = &acceptor {
                let Ok(tls) = acceptor.accept(stream.into_inner()).await else {
                    return received;
                };
                let tls: Box<dyn Io> = Box::new(tls);
                stream = BufReader::new(tls);
            }
        }
    }

    received
}

/// A TLS acceptor for `localhost` and a client configuration trusting it.
pub fn certificates() -> (TlsAcceptor, Arc<ClientConfig>) {
    mailprobe_smtp::connection::install_crypto_provider();

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

/// Returns a local port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
