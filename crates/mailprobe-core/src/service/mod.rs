//! SMTP dialogs.
//!
//! This module provides the dialogs built on the SMTP client: probing
//! whether a mailbox exists and submitting a message.

pub mod message;
pub mod probe;
pub mod send;

pub use message::OutgoingMessage;
pub use probe::{
    Attempt, MailboxCheck, ProbeOptions, Strategy, Verdict, check_mailbox, classify,
    classify_error, probe_mailbox,
};
pub use send::{SendError, SendOptions, send_mail};
