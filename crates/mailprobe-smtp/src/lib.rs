//! # mailprobe-smtp
//!
//! Line-oriented command/response transport and an SMTP client on top of it.
//!
//! ## Features
//!
//! - **Framed transport**: a byte stream is split into delimiter-terminated
//!   lines (`\n` or `\r\n`) independent of how the bytes were chunked
//! - **FIFO correlation**: each line goes to the oldest pending read
//! - **Deadlines**: every read and connect runs under a timeout; an expired
//!   read is removed from the queue and never fulfilled later
//! - **In-place STARTTLS**: the open socket is wrapped in TLS without losing
//!   buffered bytes
//! - **Type-state SMTP client**: greeting, EHLO/HELO, STARTTLS, AUTH LOGIN,
//!   MAIL FROM, RCPT TO, DATA, QUIT
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_smtp::{Address, Client, Config, Connection, Security};
//!
//! #[tokio::main]
//! async fn main() -> mailprobe_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .security(Security::StartTls)
//!         .crlf()
//!         .build();
//!     let conn = Connection::open(config).await?;
//!
//!     let client = Client::greet(&conn)
//!         .await?
//!         .ehlo("client.example.com")
//!         .await?
//!         .starttls("smtp.example.com", "client.example.com")
//!         .await?
//!         .auth_login("user@example.com", "password")
//!         .await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = Address::new("recipient@example.com")?;
//!
//!     let client = client
//!         .mail_from(&from)
//!         .await?
//!         .rcpt_to(&to)
//!         .await?
//!         .data()
//!         .await?
//!         .send_message("Subject: Test\r\n\r\nHello, World!\r\n")
//!         .await?;
//!
//!     client.quit().await?;
//!     conn.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── auth_login() ───→ Authenticated
//! └──────────────┘
//!        │
//!        └─── mail_from() ───→ MailTransaction ───→ RecipientAdded ───→ Data
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Framed connection, correlator and type-state client
//! - [`parser`]: Reply parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies, steps)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, Connected, Connection, Data, Delimiter,
    MailTransaction, RecipientAdded, Security, ServerInfo, SmtpConnection,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode, Step};
