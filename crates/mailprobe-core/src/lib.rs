//! # mailprobe-core
//!
//! Mailbox probing and message sending over SMTP.
//!
//! This crate provides:
//! - **Mailbox checks** - ask the exchangers of a domain whether a mailbox
//!   exists, stopping at `RCPT TO`
//! - **Message sending** - submit a plain-text message with optional
//!   STARTTLS and `AUTH LOGIN`
//! - **MX resolution** - DNS-over-HTTPS lookups or a fixed host list
//! - **Settings** - JSON settings in the user configuration directory
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailprobe_core::{DohResolver, ProbeOptions, check_mailbox};
//!
//! let resolver = DohResolver::default();
//! let check = check_mailbox(&resolver, "jane@example.com", &ProbeOptions::default()).await?;
//! println!("{:?}: {}", check.exists, check.reason);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod resolver;
pub mod service;

pub use config::{ProbeSettings, ResolverSettings, Security, Settings, SmtpSettings};
pub use error::{Error, Result};
pub use resolver::{DohResolver, MxRecord, MxResolver, StaticResolver, domain_from};
pub use service::{
    Attempt, MailboxCheck, OutgoingMessage, ProbeOptions, SendError, SendOptions, Strategy,
    Verdict, check_mailbox, probe_mailbox, send_mail,
};
