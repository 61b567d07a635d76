//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mailprobe_core::Security;

#[derive(Debug, Parser)]
#[command(name = "mailprobe", version, about = "Check mailboxes and send test messages over SMTP")]
pub struct Cli {
    /// Settings file (default: <config dir>/mailprobe/settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Ask the domain's mail exchangers whether a mailbox exists
    Check {
        /// Address to check
        email: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Per-operation timeout in milliseconds
        #[arg(long, value_name = "N")]
        timeout_ms: Option<u64>,
        /// Exchanger to probe instead of resolving MX records (repeatable)
        #[arg(long = "mx", value_name = "HOST")]
        mx: Vec<String>,
        /// Envelope sender for MAIL FROM
        #[arg(long)]
        sender: Option<String>,
    },
    /// Send a plain-text message
    Send {
        /// SMTP server
        #[arg(long)]
        host: Option<String>,
        /// SMTP port (default follows --security)
        #[arg(long)]
        port: Option<u16>,
        /// Connection security
        #[arg(long, value_enum)]
        security: Option<SecurityArg>,
        /// Sender address
        #[arg(long)]
        from: Option<String>,
        /// Recipient address (repeatable)
        #[arg(long, required = true)]
        to: Vec<String>,
        /// Login name (default: sender address)
        #[arg(long)]
        user: Option<String>,
        /// Password; enables AUTH LOGIN
        #[arg(long)]
        password: Option<String>,
        /// Subject line
        #[arg(long)]
        subject: String,
        /// Message body
        #[arg(long)]
        body: String,
        /// Per-operation timeout in milliseconds
        #[arg(long, value_name = "N")]
        timeout_ms: Option<u64>,
    },
    /// Write the default settings file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecurityArg {
    None,
    Starttls,
    Tls,
}

impl From<SecurityArg> for Security {
    fn from(arg: SecurityArg) -> Self {
        match arg {
            SecurityArg::None => Self::None,
            SecurityArg::Starttls => Self::StartTls,
            SecurityArg::Tls => Self::Tls,
        }
    }
}
